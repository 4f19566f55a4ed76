//! Service layer
//!
//! Business logic between the transport frontends and the data layer:
//! delivery pipeline, event fanout, presence, offline queues and the
//! user/relation/group/file domain services.

mod delivery;
mod fanout;
mod file;
mod group;
mod offline;
mod presence;
mod relation;
mod user;

pub use delivery::{DeliveryEngine, SubmitReceipt};
pub use fanout::FanoutRouter;
pub use file::FileService;
pub use group::GroupService;
pub use offline::OfflineStore;
pub use presence::PresenceService;
pub use relation::RelationService;
pub use user::{UserInfo, UserService};
