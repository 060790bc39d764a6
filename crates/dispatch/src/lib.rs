pub mod dispatcher;
pub mod keywords;

pub use dispatcher::ReplyDispatcher;
pub use keywords::{classify, Intent};
