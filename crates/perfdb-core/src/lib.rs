pub mod errors;
pub mod ids;
pub mod model;
pub mod outcomes;
pub mod policy;
pub mod reconcile;

pub use errors::*;
pub use ids::*;
pub use model::*;
pub use outcomes::*;
pub use policy::*;
pub use reconcile::*;
