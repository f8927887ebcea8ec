//! The processing window, edge cleansing, and the processor that drives
//! timeline reconstruction.

pub mod edge_cleanser;
pub mod linked_list;
pub mod processor;

pub use edge_cleanser::cleanse_edges;
pub use linked_list::TimelineLinkedList;
pub use processor::TimelineProcessor;
