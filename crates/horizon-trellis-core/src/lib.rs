//! Core systems for Horizon Trellis.
//!
//! This crate provides the foundational components of the Horizon Trellis
//! form-processing engine:
//!
//! - **Instance Data Trees**: Arena-backed XML-like trees with stable node
//!   handles, value-only vs structural mutation, and validation annotations
//! - **Effective-Id Addressing**: Pure string algebra naming every runtime
//!   object under component nesting and repeat iteration
//! - **Lifecycle Events**: The closed set of events driving the model
//!   consistency pipeline
//!
//! # Data Tree Example
//!
//! ```
//! use horizon_trellis_core::DataTree;
//!
//! let mut tree = DataTree::new("order");
//! let item = tree.append_child(tree.root(), "item").unwrap();
//! tree.set_value(item, "widget").unwrap();
//!
//! assert_eq!(tree.value(item), Some("widget"));
//! assert_eq!(tree.children(tree.root()).len(), 1);
//! ```
//!
//! # Effective-Id Example
//!
//! ```
//! use horizon_trellis_core::ident;
//!
//! // An object inside nested components, at repeat iterations 1 and 2.
//! let id = "foo$bar$my-input.1-2";
//! assert_eq!(ident::prefix(id), "foo$bar$");
//! assert_eq!(ident::static_id_of(id), "my-input");
//! assert_eq!(ident::suffix_parts(id).unwrap(), vec![1, 2]);
//! ```

pub mod event;
pub mod ident;
pub mod tree;
pub mod xml;

pub use event::LifecycleEvent;
pub use ident::MalformedId;
pub use tree::{DataTree, NodeAnnotations, NodeId, NodeRef, TreeError, TreeId};
pub use xml::XmlError;
