//! # Petri 网核心定义（Place/Transition Net）
//!
//! 设库所集合 `P` 与迁移集合 `T`。每条弧连接一个库所与一个迁移，权重恒为 1，
//! 该二部性在 [`Net::new`] 构造时即被校验。对任意标识 `M ∈ ℕ^{|P|}`：
//!
//! * 迁移 `t` **可激发** 当且仅当其每个输入库所至少持有一个 token；
//! * 迁移 **发射** 后 `M' = M + e_t · C`，其中 `C` 为 [`IncidenceMatrix`]，
//!   且任一有界库所（`capacity > 0`）发射后不得超过其容量。
//!
//! ## 示例
//!
//! ```rust
//! use petriflow::net::*;
//!
//! let net = NetBuilder::new()
//!     .place(Place::new_with_tokens_and_capacity("off", 1, 0))
//!     .place(Place::new("shining"))
//!     .transition("illuminate")
//!     .arc("off", "illuminate")
//!     .arc("illuminate", "shining")
//!     .build()
//!     .unwrap();
//!
//! let mut engine = Engine::new(std::sync::Arc::new(net));
//! engine.fire_named("illuminate").unwrap();
//! assert_eq!(engine.tokens("off"), Some(0));
//! assert_eq!(engine.tokens("shining"), Some(1));
//! ```

pub mod core;
pub mod engine;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod io;
pub mod structure;

pub use self::core::{DiagnosticReport, FireError, Net, NetBuilder, NetError};
pub use engine::Engine;
pub use ids::{ArcId, PlaceId, TransitionId};
pub use incidence::IncidenceMatrix;
pub use index_vec::{Idx, IndexVec};
pub use io::{NetDefinition, read_net, write_net};
pub use structure::{Arc, Marking, MarkingSnapshot, Node, Place, Transition, Weight};
