//! Domain types and models

pub mod actor;
pub mod pagination;
pub mod request;

pub use actor::{Actor, AuthenticatedActor, AuthorizationGrant};
pub use pagination::{Cursor, Direction, PageInfo, PagedResult};
pub use request::{Authentication, EncodedBody, Method, Request, Response};
