//! Testing infrastructure for junifer.
//!
//! Fast, deterministic tests without external binaries or network access:
//!
//! - **[`JuniferTestEnv`]**: temporary data and working directories with a
//!   [`Context`](crate::context::Context) bound to them
//! - **[`RecordingRunner`]**: records external tool invocations and fabricates
//!   their outputs
//! - **[`StaticFetcher`]**: serves downloads from memory
//! - **Pipeline mocks**: [`MockDataGrabber`], [`MockPreprocessor`],
//!   [`MockMarker`] and [`MockStorage`]
//! - **Assertion macros**: `assert_result_ok!`, `assert_result_err!`,
//!   `assert_contains_error!` and `assert_same_kinds!`, exported at the crate
//!   root
//!
//! # Quick Start
//!
//! ```rust
//! use junifer::assert_result_ok;
//! use junifer::testkit::{JuniferTestEnv, MockDataGrabber, MockMarker};
//! use junifer::pipeline::{DataItem, DataObject, MarkerCollection};
//! use junifer::data::Space;
//!
//! let env = JuniferTestEnv::new();
//! let mut data = DataObject::new();
//! data.insert_item("BOLD", DataItem::new(Space::Native));
//! let grabber = MockDataGrabber::new(&["BOLD"]).with_element("sub-01", data.clone());
//!
//! let collection = MarkerCollection::new(
//!     vec![Box::new(MockMarker::new("mean", &["BOLD"]))],
//!     None,
//!     vec![],
//!     None,
//! )
//! .unwrap();
//! assert_result_ok!(collection.validate(&grabber));
//! let output = assert_result_ok!(collection.fit(env.context(), data)).unwrap();
//! assert!(output["mean"].contains_key("BOLD"));
//! ```

pub mod assertions;
pub mod helpers;
pub mod mock_env;
pub mod mocks;

pub use helpers::{bold_object, blob_image, constant_image, label_image, save_image, with_warp};
pub use mock_env::JuniferTestEnv;
pub use mocks::{
    MockDataGrabber, MockMarker, MockPreprocessor, MockStorage, RecordedCommand, RecordingRunner,
    StaticFetcher,
};
