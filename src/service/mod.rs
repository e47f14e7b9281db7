pub mod messenger;
pub mod poller;
pub mod views;

pub use messenger::Messenger;
pub use poller::PollHandle;
pub use views::{ConversationListView, ThreadView};
