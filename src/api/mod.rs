pub mod attendance;
pub mod audit;
pub mod presence;
pub mod zone;
