//! Domain model for the team roster.
//!
//! Three default members are defined in code. A project may store override
//! records for them, merged on read. Custom members are stored in full.

mod error;
mod member;

pub use error::TeamDomainError;
pub use member::{
    NewTeamMember, TeamMember, TeamMemberId, TeamMemberKind, TeamMemberOverride,
    TeamMemberPatch, TeamMemberSnapshot, TeamMemberStatus,
};
