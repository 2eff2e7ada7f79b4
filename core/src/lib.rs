pub mod core;
pub mod cpu;
pub mod device;
pub mod logger;
pub mod save;

pub mod prelude {
    pub use crate::core::machine::{InputButton, Machine};
    pub use crate::core::sched::{FrameTimer, StopFlag};
    pub use crate::core::{Access, Bus, IntAck, MemoryMap, Region, Target};
    pub use crate::cpu::Cpu;
    pub use crate::save::{BlockFile, BlockReader, BlockWriter};
}
