mod error;
mod flags;
mod ids;
mod record;
mod table;

pub(crate) use self::error::check_group;
pub(crate) use self::error::fatal;
pub(crate) use self::table::AnchorTable;

pub use self::error::FlagGroupError;
pub use self::flags::EventFlags;
pub use self::ids::ObjectId;
pub use self::record::PollKey;
pub use self::record::PollRecord;
pub use self::record::ProcessEvent;
pub use self::record::WatchDescriptor;
