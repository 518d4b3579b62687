pub mod util;

pub use util::{split_csv, temp_store_dir};
