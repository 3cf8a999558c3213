pub mod down;
pub mod params;
pub mod state;
pub mod status;
pub mod up;
