pub mod adapter;
pub mod address;
pub mod context;
pub mod cursor;
pub mod dom;
pub mod events;
pub mod finder;
pub mod highlighter;
pub mod index;
pub mod range;
pub mod registry;
pub mod render;

// Re-export key types for easier usage
pub use adapter::TreeAdapter;
pub use address::{AddressError, AddressPoint, AddressRange, Codec};
pub use context::{Options, QuerySet};
pub use cursor::Cursor;
pub use dom::{Document, MarkupError, NodeId};
pub use events::{CursorEvent, DEFAULT_EVENT_CAPACITY, EngineEvent, EventQueue};
pub use finder::{AddressRangeFinder, Finder, FinderError, LiteralFinder, QuerySubject};
pub use highlighter::{HighlightError, Highlighter, QuerySettings};
pub use index::{IndexError, Marker, TextIndex};
pub use range::{NodeVisitor, Range, RangeDescriptor, RangeError};
pub use registry::{HighlightEntry, HighlightId, HighlightRegistry, RegistryError};
pub use render::{Pump, RenderError, RenderMode};
