mod filter;
mod priority;
mod remote;
mod todo;
mod todo_list;

pub use filter::TodoFilter;
pub use priority::Priority;
pub use remote::{LedgerRecord, ListMetadata, PublishPayload, PublishReceipt};
pub use todo::{
    is_local_ref, local_ref, parse_due_date, short_id, Todo, TodoPatch, LOCAL_REF_PREFIX,
};
pub use todo_list::TodoList;
