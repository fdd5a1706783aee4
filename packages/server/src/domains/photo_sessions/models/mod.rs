pub mod session;
pub mod slot;

pub use session::{PhotoSession, PhotoSessionStatus};
pub use slot::{PhotographerSlot, ServiceArea, SlotStatus};
