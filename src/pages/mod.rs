//! Page revisions: querying, normalization and staged writes.
//!
//! A revision is read with one query joining `pages`, `meta`, `pages_blocks`
//! and `modules_extras`. The raw row, with page columns prefixed `p_`, is then
//! reshaped into a flat snake-case [`PageRecord`]:
//!
//! ```text
//! p_revisionId  -> revision_id
//! p_allowDelete -> allow_delete   ("1"/"0", forced to false for protected pages)
//! publish_on    -> publish_on     (Unix timestamp, replaces the page column)
//! p_data        -> data           (decoded structure)
//! ```

mod data;
mod model;
mod normalize;
mod repository;

pub use data::{decode_data, DataError};
pub use model::{
    is_forbidden_to_delete, is_forbidden_to_have_children, is_forbidden_to_move, Page,
    PageRecord, PageStatus, ERROR_PAGE_ID, HOME_PAGE_ID,
};
pub use normalize::{
    flag, normalize_column, normalize_row, snake_case, split_words, RawRow, RawValue,
    PAGE_PREFIX,
};
pub use repository::{PageRepository, PageUnitOfWork};
