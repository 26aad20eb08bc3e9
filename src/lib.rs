// --- Module Structure ---
// `pipeline`:  The public build API and configuration.
// `driver`:    Walks the source tree and decides storyline boundaries.
// `storyline`: Entry/wrapper/container bookkeeping for one storyline.
// `margins`:   Deferred-style resolution and margin collapsing at build.
// `inline`:    Recursive descent over inline segment trees.
// `events`:    Style events and their non-overlapping segmentation.
// `entry`:     The content-entry intermediate representation.
// `content`:   Size-bounded text buckets with (name, offset) back-refs.
// `text`:      The whitespace-normalizing, rune-counting writer.
// `fragment`:  Typed, named output fragments.
// `error`:     Crate error types.

mod content;
mod driver;
mod entry;
mod error;
mod events;
mod fragment;
mod inline;
mod margins;
mod pipeline;
mod storyline;
mod text;

pub use crate::content::{ContentAccumulator, MAX_CONTENT_FRAGMENT_SIZE};
pub use crate::driver::MAX_STORYLINE_SPLIT_DEPTH;
pub use crate::entry::{CellExtras, ContentEntry, EntryContent, EntryType, MixedItem, StyleSlot};
pub use crate::error::BuildError;
pub use crate::events::{fill_style_event_gaps, segment_events, StyleEvent};
pub use crate::fragment::{resource_path_fragment, Fragment, FragmentList};
pub use crate::inline::{spanning_style_chain, InlineChunk, InlineOutput, InlineWalker};
pub use crate::pipeline::{
    build_publication, CoverSpec, PublicationOptions, PublicationOptionsBuilder,
};
pub use crate::storyline::{
    ContainerFlags, ContainerInfo, ContainerKind, MixedPart, StorylineBuilder,
};
pub use crate::text::TextBuilder;
