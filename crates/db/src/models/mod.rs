mod task;

pub use task::TaskRow;
