//! Publisher and subscriber facades.
//!
//! Both wrap a `ConnectionManager` of their role. The subscriber side adds a
//! `Dispatcher`, which sits between the connection's session task and the
//! registered handler and lets each distinct payload through once.

pub mod dispatcher;
pub mod publisher;
pub mod subscriber;

pub use dispatcher::Dispatcher;
pub use publisher::Publisher;
pub use subscriber::Subscriber;
