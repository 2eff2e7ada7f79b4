pub mod driveboard;
pub mod dsb;
pub mod model3;
pub mod rom_loader;
pub mod soundboard;

pub use driveboard::DriveBoard;
pub use dsb::{DigitalSoundBoard, Dsb1, Dsb2};
pub use model3::Model3;
pub use soundboard::SoundBoard;
