pub mod rate;
pub mod run;
pub mod setup;
pub mod status;
pub mod ui;
