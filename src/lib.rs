pub mod app;

pub use livetrader_core::prelude::*;
pub use livetrader_exchange::prelude::*;
pub use livetrader_strategy::prelude::*;
pub use livetrader_execution::prelude::*;
pub use livetrader_monitoring::prelude::*;

pub mod prelude {
    pub use crate::app::LiveTraderApp;
    pub use livetrader_core::prelude::*;
    pub use livetrader_exchange::prelude::*;
    pub use livetrader_strategy::prelude::*;
    pub use livetrader_execution::prelude::*;
    pub use livetrader_monitoring::prelude::*;
}
