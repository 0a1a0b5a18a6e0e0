pub mod cleanup;
pub mod down;
pub mod ps;
pub mod run;
pub mod up;
pub mod validate;
