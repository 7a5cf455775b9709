pub mod action;
pub mod controller;
pub mod dispatcher;
pub mod session;

pub use action::{Action, DispatchError};
pub use dispatcher::{Dispatcher, Reply};
pub use session::Session;
