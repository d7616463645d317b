// Entity Models
//
// Primary store entities (read-write):
// - Client 1-N ClientClassifier 1-N CodeSession 1-N TradeType / Cost
// - Session, Product, HandlInst and the cost reference tables
//
// Limit store entities (read-only, owned by another system):
// - ClientInfo, ClientTrade, ClientLimit, ClientView

pub mod client;
pub mod session;
pub mod reference;
pub mod cost;
pub mod limit;

pub use client::{Client, ClientClassifier};
pub use session::{CodeSession, NewSession, Session, TradeType};
pub use reference::{HandlInst, HandlingKind, NamedRef, Product, ProductKind, ReferenceKind};
pub use cost::{CostCategory, CostLine, NewCost};
pub use limit::{
    ClientInfo, ClientLimit, ClientTrade, ClientView, LimitPeriod, LimitProduct, LimitSlot,
    OrderLimits,
};
