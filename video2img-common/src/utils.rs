pub mod fsutils;
pub mod natsort;
pub mod time;
pub mod work_queue;
pub mod workers;
