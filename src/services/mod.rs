pub mod catalog;
pub mod dispatcher;
pub mod execution;
pub mod lifecycle;
pub mod persistence;
pub mod piazza;
pub mod poller;
pub mod supervisor;
