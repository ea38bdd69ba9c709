pub mod calendar;
pub mod client;
pub mod energi_data;
pub mod forecast;
pub mod retry;
pub mod scout;
pub mod tesla;
