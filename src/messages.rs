//! User-facing reply texts

/// Invitation shown to users who have not registered yet
pub const ASK_FOR_REGISTRATION: &str = "註冊之後就可以開始玩囉！";
/// Label of the registration button
pub const REGISTER_LABEL: &str = "開始註冊";
/// Label of every cancel button
pub const CANCEL_LABEL: &str = "取消";
/// Label of every confirm button
pub const CONFIRM_LABEL: &str = "確認";
/// Reply to declining the invitation
pub const REGISTRATION_DECLINED: &str = "等你喔 >/////<";

/// Prompt for the registration email
pub const ASK_FOR_EMAIL: &str = "請輸入註冊的電子郵件";
/// Prompt for the email after dismissing the identity picker
pub const ASK_FOR_EMAIL_AGAIN: &str = "請輸入 email 以進行註冊：";
/// The typed text is not an email
pub const INVALID_EMAIL: &str = "不合法的信箱，請重新輸入";
/// No attendee registered under the email or serial
pub const REGISTRATION_NOT_FOUND: &str = "從報名資料裡找不到這個 email 耶，按「開始註冊」再試一次吧～";
/// Identity picker headline
pub const PICK_IDENTITY_TITLE: &str = "你是下面其中一位嗎？";
/// Identity picker instructions
pub const PICK_IDENTITY_TEXT: &str = "若不是，請選擇「取消」並重新輸入正確的 email";
/// Binding succeeded
pub const REGISTRATION_SUCCEEDED: &str = "註冊成功！開始玩吧～";
/// The chat identity is bound already
pub const ALREADY_BOUND: &str = "這個帳號已經綁定了喔！直接玩吧 yaya！";

/// A question is already open
pub const GAME_IN_PROGRESS: &str = "遊戲已經在進行中～";
/// An answer arrived with no open question
pub const NO_OPEN_QUESTION: &str = "目前沒有進行中的題目喔～請輸入或按下「玩遊戲」來開始答題！";
/// Every question has been answered
pub const NO_MORE_QUESTIONS: &str = "題目都答完了！謝謝你的參與～";
/// The question could not be shown
pub const QUESTION_UNAVAILABLE: &str = "這題出了點問題，請稍後再按「玩遊戲」～";
/// The game was paused
pub const GAME_PAUSED: &str = "狀態已清除！按「玩遊戲」以繼續玩遊戲計分～";
/// Label of the button on a carousel card
pub const CHOOSE_LABEL: &str = "選擇";
/// Default menu headline
pub const MENU_TEXT: &str = "開始遊戲，請選擇";
/// Menu label that leaves
pub const EXIT_LABEL: &str = "不玩了";
/// The registration flow was reset
pub const SESSION_RESET: &str = "清除狀態，雄壯威武！";
/// Reply to leaving the menu
pub const GOODBYE: &str = "記得要再回來啊～～～～！";

/// Unbind confirmation question
pub const CONFIRM_UNBIND: &str = "真的要走嗎 QQ ～如果要再回來的話，重新註冊分數還會在喔！";
/// Unbind was cancelled
pub const UNBIND_CANCELLED: &str = "留下來了耶耶耶！";
/// Unbind completed
pub const UNBOUND: &str = "解除完成，再次按下或輸入「開始註冊」就可以再次玩遊戲喔～等你 >////<";

/// Feedback after a correct answer
pub fn correct(score: u64) -> String {
    format!("答對了 ^^ 加油加油！目前 {score} 分")
}

/// Feedback after a wrong answer
pub fn wrong(score: u64) -> String {
    format!("答錯了 QQ 再接再厲！目前 {score} 分")
}

/// Score lookup reply
pub fn score(score: u64) -> String {
    format!("你目前的分數是：{score} 分")
}

/// Title of a carousel card
pub fn option_title(letter: char) -> String {
    format!("選項 {letter}")
}
