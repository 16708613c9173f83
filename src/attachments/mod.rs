/// Attachment stores: ordered actor attribution and evidence items
pub mod actors;
pub mod evidence;

pub use actors::{ActorAttribution, ActorManager};
pub use evidence::{Evidence, EvidenceManager, NewEvidence};
