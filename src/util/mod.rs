pub mod asset_loader;
pub mod form;
pub mod pagination;
pub mod validation;
