pub mod sim_bus;
pub mod sim_node;
pub mod utils;

pub mod prelude {
    pub use super::sim_bus::{SimBus, SimBusReceiver, SimBusSender};
    pub use super::sim_node::{SimNode, WriteLog, WriteRecord};
    pub use super::utils::{
        counter_eds_path, count_frames, get_sdo_client, test_with_background_node, BusLogger,
        SimProvider,
    };
    pub use sdoex_client::{RawAbortCode, SdoClientError};
    pub use sdoex_common::{sdo::AbortCode, NodeId};
    pub use sdoex_sim::WriteOutcome;
}
