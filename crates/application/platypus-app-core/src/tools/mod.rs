pub mod duplicate_finder;

pub use duplicate_finder::{
    DuplicateFileVm, DuplicateFinderProperty, DuplicateFinderVm, DuplicateGroupVm,
};
