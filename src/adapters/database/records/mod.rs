pub mod conversation;
pub mod friend_request;
pub mod message;
pub mod user;

pub use conversation::ConversationRecord;
pub use friend_request::FriendRequestRecord;
pub use message::MessageRecord;
pub use user::{UserRecord, UserSummaryRecord};
