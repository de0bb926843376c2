mod bucketer;
mod clock;
mod condition;
mod decision;
mod evaluator;
mod experiment_condition;
mod flow;
mod in_app_message;
mod matcher;
mod remote_config;
mod target;
mod target_event;
mod test_common;
mod user;
mod value;
mod workspace;

pub use bucketer::{Bucketer, Sha1Bucketer};
pub use clock::*;
pub use decision::*;
pub use evaluator::*;
pub use in_app_message::*;
pub use remote_config::*;
pub use target::*;
pub use user::*;
pub use value::*;
pub use workspace::*;
