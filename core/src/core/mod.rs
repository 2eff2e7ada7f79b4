pub mod bus;
pub mod machine;
pub mod sched;

pub use bus::{Access, Bus, IntAck, MemoryMap, Region, Target};
pub use machine::{InputButton, Machine};
pub use sched::{FrameTimer, StopFlag, TimerEvent};
