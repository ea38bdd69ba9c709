pub mod deadline;
pub mod gateway;
pub mod limits;
pub mod machine;
pub mod planner;
pub mod price;
pub mod tariff;
pub mod vehicle;
pub mod window;
pub mod zone;
