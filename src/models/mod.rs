pub mod count;
pub mod event;
pub mod product;
pub mod recount;
pub mod user;

pub use count::{Count, CountTotal, NewCount, TierQuantities};
pub use event::StocktakeEvent;
pub use product::{PackagingRatios, Product, ProductIdentifier, ProductLookup};
pub use recount::{NewRecountTask, RecountFilter, RecountTask};
pub use user::{Role, User, WarehouseAssignment};
