mod courier;
mod matching;
mod order;
mod relay;
mod route;
mod shipment;
mod task;
mod zone;

pub use courier::*;
pub use matching::*;
pub use order::*;
pub use relay::*;
pub use route::*;
pub use shipment::*;
pub use task::*;
pub use zone::*;
