pub mod phase;
pub mod request;
pub mod run;
