pub mod finding;
pub mod role;
pub mod run;
pub mod work;
