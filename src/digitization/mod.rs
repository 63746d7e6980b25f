pub mod audit;
pub mod box_id;
pub mod collect;
pub mod config;
pub mod import;
pub mod inventory;
pub mod legacy;
pub mod locator;
pub mod metadata;
pub mod paths;
pub mod pdf_check;
pub mod reconcile;
pub mod util;
pub mod warn;
pub mod whitespace;
pub mod xml_tree;
