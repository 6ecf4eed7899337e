//! Shared domain types for the archivist preservation pipeline: tags,
//! payload/tar/bag results, the process-status ledger row, the preservation
//! object model, and the naming rules that relate bucket names, bag keys,
//! and object identifiers (spec §3, §6).

pub mod naming;
pub mod payload;
pub mod preservation;
pub mod process_status;

pub use naming::{
    clean_bag_name, delivery_bucket, object_identifier, owner_of, restore_bag_name, AccessRights,
    NamingError, DEFAULT_BAG_PADDING, DEFAULT_BAG_SIZE_LIMIT,
};
pub use payload::{BagIdentity, BagReadResult, PayloadFile, Tag, TarResult};
pub use preservation::{
    ingest_event_sequence, Event, EventType, Outcome, PreservationObject, PreservedFile,
    FIXITY_AGENT, FIXITY_OBJECT,
};
pub use process_status::{ProcessStatusRecord, Stage, Status};
