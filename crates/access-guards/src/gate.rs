use crate::policy::{is_officer_qualified, is_staff_qualified};
use guard_core::{ChannelId, GuardSettings, GuildId, RoleId, RoleLadder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

const STAFF_TEAM_ONLY: &str =
    "This command can only be used by the MPS Staff Team. Please make sure you have the correct role assigned.";
const WRONG_CHANNEL: &str =
    "This command cannot be used in this channel. Please make sure you are in the correct channel.";
const WRONG_SERVER: &str =
    "This bot does not work in this server. Please make sure you are in the correct server.";
const NO_DIRECT_MESSAGE: &str = "This bot does not support direct messages.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DenialKind {
    OfficerOnly,
    StaffOnly,
    WrongChannel,
    WrongServer,
    NoDirectMessage,
}

impl DenialKind {
    pub fn default_message(self) -> &'static str {
        match self {
            DenialKind::OfficerOnly | DenialKind::StaffOnly => STAFF_TEAM_ONLY,
            DenialKind::WrongChannel => WRONG_CHANNEL,
            DenialKind::WrongServer => WRONG_SERVER,
            DenialKind::NoDirectMessage => NO_DIRECT_MESSAGE,
        }
    }
}

/// Rejection returned by the gate. Renders as the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub kind: DenialKind,
    message: Option<String>,
}

impl Denial {
    pub fn new(kind: DenialKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message())
    }

    /// Role and channel denials are routine; callers usually skip logging them.
    pub fn is_expected(&self) -> bool {
        matches!(
            self.kind,
            DenialKind::OfficerOnly | DenialKind::StaffOnly | DenialKind::WrongChannel
        )
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for Denial {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny(Denial),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    pub fn into_result(self) -> Result<(), Denial> {
        match self {
            GateDecision::Allow => Ok(()),
            GateDecision::Deny(denial) => Err(denial),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    MpsOnly,
    StaffOnly,
    ChannelRestricted {
        allowed: BTreeSet<ChannelId>,
        message: Option<String>,
    },
    /// Rejects invocations outside any guild (direct messages).
    GuildOnly,
    /// Rejects invocations from any guild but the governed one.
    HomeGuild(GuildId),
}

impl Capability {
    pub fn channel_restricted(allowed: impl IntoIterator<Item = ChannelId>) -> Self {
        Capability::ChannelRestricted {
            allowed: allowed.into_iter().collect(),
            message: None,
        }
    }

    pub fn admin_channel_only(settings: &GuardSettings) -> Self {
        Capability::ChannelRestricted {
            allowed: [settings.admin_bot_channel].into_iter().collect(),
            message: Some("This command only works in the admin bot channel.".into()),
        }
    }

    pub fn general_channel_only(settings: &GuardSettings) -> Self {
        Capability::ChannelRestricted {
            allowed: [settings.admin_bot_channel, settings.general_bot_channel]
                .into_iter()
                .collect(),
            message: Some(
                "This command only works in the general bot channel or admin bot channel.".into(),
            ),
        }
    }

    /// Checks applied to every command: no direct messages, home guild only.
    pub fn global(settings: &GuardSettings) -> Vec<Self> {
        vec![Capability::GuildOnly, Capability::HomeGuild(settings.server_id)]
    }

    fn cost(&self) -> u8 {
        match self {
            Capability::GuildOnly => 0,
            Capability::HomeGuild(_) => 1,
            Capability::ChannelRestricted { .. } => 2,
            Capability::MpsOnly | Capability::StaffOnly => 3,
        }
    }
}

/// Who invoked a command and where. `roles` is `None` when the invoker
/// could not be resolved as a guild member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub roles: Option<BTreeSet<RoleId>>,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
}

impl InvocationContext {
    pub fn new(
        roles: Option<BTreeSet<RoleId>>,
        channel_id: ChannelId,
        guild_id: Option<GuildId>,
    ) -> Self {
        Self {
            roles,
            channel_id,
            guild_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandGate {
    ladder: RoleLadder,
}

impl CommandGate {
    pub fn new(ladder: RoleLadder) -> Self {
        Self { ladder }
    }

    pub fn ladder(&self) -> &RoleLadder {
        &self.ladder
    }

    pub fn authorize(&self, capability: &Capability, ctx: &InvocationContext) -> GateDecision {
        let denied = match capability {
            Capability::MpsOnly => (!is_officer_qualified(&self.ladder, ctx.roles.as_ref()))
                .then(|| Denial::new(DenialKind::OfficerOnly)),
            Capability::StaffOnly => (!is_staff_qualified(&self.ladder, ctx.roles.as_ref()))
                .then(|| Denial::new(DenialKind::StaffOnly)),
            Capability::ChannelRestricted { allowed, message } => {
                (!allowed.contains(&ctx.channel_id)).then(|| {
                    let denial = Denial::new(DenialKind::WrongChannel);
                    match message {
                        Some(message) => denial.with_message(message.clone()),
                        None => denial,
                    }
                })
            }
            Capability::GuildOnly => ctx
                .guild_id
                .is_none()
                .then(|| Denial::new(DenialKind::NoDirectMessage)),
            Capability::HomeGuild(home) => match ctx.guild_id {
                Some(guild) if guild == *home => None,
                Some(_) => Some(Denial::new(DenialKind::WrongServer)),
                None => Some(Denial::new(DenialKind::NoDirectMessage)),
            },
        };

        match denied {
            Some(denial) => {
                debug!(kind = ?denial.kind, channel = %ctx.channel_id, "command denied");
                GateDecision::Deny(denial)
            }
            None => GateDecision::Allow,
        }
    }

    /// All capabilities must pass. Cheap location checks run before role
    /// checks; the first denial is returned.
    pub fn authorize_all(
        &self,
        capabilities: &[Capability],
        ctx: &InvocationContext,
    ) -> GateDecision {
        let mut ordered: Vec<&Capability> = capabilities.iter().collect();
        ordered.sort_by_key(|c| c.cost());
        for capability in ordered {
            if let GateDecision::Deny(denial) = self.authorize(capability, ctx) {
                return GateDecision::Deny(denial);
            }
        }
        GateDecision::Allow
    }
}
