pub mod action;
pub mod flow;
pub mod models;

pub use action::Action;
pub use flow::FlowStep;
pub use models::{
    Actor, Channel, Comment, Confession, ConfessionStatus, CustomButton, Link, Reply, Role,
    VoteDirection, VoteTally,
};
