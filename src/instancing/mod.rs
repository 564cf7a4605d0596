//! Instancing
//!
//! [`InstanceGenerator`] owns the instance transforms and selection of one
//! instanced primitive and drives its [`InstanceGeometry`] display objects
//! through a `Clean → NeedUpdate → NeedRecreate` state machine.

pub mod display;
pub mod generator;

pub use display::{InstanceBuffer, InstanceDisplay, InstanceGeometry, InstanceRaw, SelectionMaterials};
pub use generator::{DirtyState, InstanceData, InstanceGenerator};
