use serde::{Deserialize, Serialize};

use crate::errors::HuddleError;
use crate::media::MediaStreamRef;

pub type ParticipantId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub color: String,
    /// Lower ranks are listed first in the member panel.
    pub rank: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub role: Option<Role>,
    pub presence: Presence,
    pub is_local: bool,
    pub video_enabled: bool,
    pub muted: bool,
    pub screen_sharing: bool,
    /// Only ever set on derived render state, never on roster entries.
    pub media_stream: Option<MediaStreamRef>,
}

impl Participant {
    /// A roster entry with no media. The roster decides whether it is local.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
            role: None,
            presence: Presence::Online,
            is_local: false,
            video_enabled: false,
            muted: true,
            screen_sharing: false,
            media_stream: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }
}

/// A titled section of the member list panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberGroup {
    pub title: String,
    pub color: Option<String>,
    pub members: Vec<Participant>,
}

/// The conference roster. Exactly one entry is local once seeded.
///
/// Media flags of the local entry are never written here: they are
/// projected from the session flags when render state is derived.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    participants: Vec<Participant>,
    local_id: Option<ParticipantId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the local participant, merging with an existing entry of the
    /// same id (its role survives, name and avatar come from `local`).
    pub fn seed_local(&mut self, local: Participant) {
        if let Some(previous) = self.local_id.take() {
            if let Some(p) = self.participant_mut(&previous) {
                p.is_local = false;
            }
        }

        let id = local.id.clone();
        match self.participants.iter().position(|p| p.id == id) {
            Some(index) => {
                let mut existing = self.participants.remove(index);
                existing.is_local = true;
                existing.display_name = local.display_name;
                if local.avatar_ref.is_some() {
                    existing.avatar_ref = local.avatar_ref;
                }
                if local.role.is_some() {
                    existing.role = local.role;
                }
                existing.presence = Presence::Online;
                self.participants.insert(0, existing);
            }
            None => {
                let mut local = local;
                local.is_local = true;
                local.presence = Presence::Online;
                self.participants.insert(0, local);
            }
        }
        self.local_id = Some(id);
    }

    /// Add a remote participant. Duplicates are ignored.
    pub fn add_participant(&mut self, mut info: Participant) {
        if self.participants.iter().any(|p| p.id == info.id) {
            return;
        }
        info.is_local = false;
        info.screen_sharing = false;
        info.media_stream = None;
        self.participants.push(info);
    }

    pub fn remove_participant(&mut self, id: &str) {
        if self.local_id.as_deref() == Some(id) {
            self.local_id = None;
        }
        self.participants.retain(|p| p.id != id);
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    fn remote_mut(&mut self, id: &str) -> Result<&mut Participant, HuddleError> {
        if self.local_id.as_deref() == Some(id) {
            return Err(HuddleError::ValidationRejected(
                "local media state is owned by the session".into(),
            ));
        }
        self.participant_mut(id)
            .ok_or_else(|| HuddleError::ValidationRejected(format!("unknown participant {id}")))
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn local(&self) -> Option<&Participant> {
        self.local_id.as_deref().and_then(|id| self.participant(id))
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn set_presence(&mut self, id: &str, presence: Presence) -> Result<(), HuddleError> {
        self.remote_mut(id)?.presence = presence;
        Ok(())
    }

    pub fn set_remote_media(
        &mut self,
        id: &str,
        muted: bool,
        video_enabled: bool,
    ) -> Result<(), HuddleError> {
        let p = self.remote_mut(id)?;
        p.muted = muted;
        p.video_enabled = video_enabled;
        Ok(())
    }

    /// Drop every remote entry and take the local one offline.
    pub fn disconnect(&mut self) {
        let local_id = self.local_id.clone();
        self.participants
            .retain(|p| local_id.as_deref() == Some(p.id.as_str()));
        if let Some(local) = local_id.as_deref().and_then(|id| self.participant_mut(id)) {
            local.presence = Presence::Offline;
            local.video_enabled = false;
            local.muted = true;
            local.screen_sharing = false;
        }
    }

    pub fn clear(&mut self) {
        self.participants.clear();
        self.local_id = None;
    }
}

/// Member list sections: online members by role rank (role-less last),
/// then everyone offline. Empty sections are left out.
///
/// Pass derived render state so the local entry carries the session flags.
pub fn member_groups(participants: &[Participant]) -> Vec<MemberGroup> {
    let mut roles: Vec<&Role> = Vec::new();
    for role in participants.iter().filter_map(|p| p.role.as_ref()) {
        if !roles.iter().any(|r| r.name == role.name) {
            roles.push(role);
        }
    }
    roles.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));

    let online = |p: &&Participant| p.presence == Presence::Online;
    let mut groups: Vec<MemberGroup> = roles
        .into_iter()
        .map(|role| MemberGroup {
            title: role.name.clone(),
            color: Some(role.color.clone()),
            members: participants
                .iter()
                .filter(online)
                .filter(|p| p.role.as_ref().is_some_and(|r| r.name == role.name))
                .cloned()
                .collect(),
        })
        .collect();

    groups.push(MemberGroup {
        title: "Members".into(),
        color: None,
        members: participants
            .iter()
            .filter(online)
            .filter(|p| p.role.is_none())
            .cloned()
            .collect(),
    });
    groups.push(MemberGroup {
        title: "Offline".into(),
        color: None,
        members: participants
            .iter()
            .filter(|p| p.presence == Presence::Offline)
            .cloned()
            .collect(),
    });

    for group in &mut groups {
        group
            .members
            .sort_by_key(|p| p.display_name.to_lowercase());
    }
    groups.retain(|g| !g.members.is_empty());
    groups
}
