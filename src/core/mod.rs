//! Core policy model, evaluation and activation

pub mod acl;
pub mod activation;
pub mod constraint;
pub mod error;
pub mod events;
pub mod expression;
pub mod external;
pub mod legacy;
pub mod policy;
pub mod principal;
pub mod temporary;
pub mod validation;
