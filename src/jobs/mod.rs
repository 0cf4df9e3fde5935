// Jobs module - periodic background work

pub mod expiry_sweeper;
