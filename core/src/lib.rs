pub mod index;
pub mod store;
pub mod tokenizer;

pub use index::{DocId, IndexStats, KeywordIndex, RankedNote};
pub use store::{Meeting, MeetingStore, MeetingUpdate, NewMeeting, StorePaths};
