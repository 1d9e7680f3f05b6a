//! Pure formatting of roster posts and notices. No I/O.

use chrono_tz::Tz;
use serde::Serialize;

use crate::db::models::{Event, Role, Signup, WaitlistEntry};

use super::messaging::{Embed, EmbedField, OutgoingMessage, SignupView};
use super::parsing::{format_local_time, format_offset};

const ROSTER_COLOR: u32 = 0x5865F2;
const EMPTY: &str = "-";

/// Everything needed to draw one roster post.
#[derive(Debug, Clone, Serialize)]
pub struct RosterSnapshot {
    pub event: Event,
    pub roles: Vec<Role>,
    pub signups: Vec<Signup>,
    pub waitlist: Vec<WaitlistEntry>,
}

fn mentions<'a>(users: impl Iterator<Item = &'a i64>) -> String {
    users
        .map(|id| format!("<@{}>", id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One line per role: `**tank** [1/2]: <@1>`.
pub fn roster_lines(roles: &[Role], signups: &[Signup]) -> String {
    roles
        .iter()
        .map(|role| {
            let members: Vec<&i64> = signups
                .iter()
                .filter(|s| s.role_name == role.name)
                .map(|s| &s.user_id)
                .collect();
            let tags = if members.is_empty() {
                EMPTY.to_string()
            } else {
                mentions(members.iter().copied())
            };
            format!("**{}** [{}/{}]: {}", role.name, members.len(), role.capacity, tags)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Waitlisted users grouped by desired role; roles that no longer exist are
/// listed last and marked.
pub fn waitlist_lines(roles: &[Role], waitlist: &[WaitlistEntry]) -> String {
    let mut lines = Vec::new();
    for role in roles {
        let users: Vec<&i64> = waitlist
            .iter()
            .filter(|w| w.role_name == role.name)
            .map(|w| &w.user_id)
            .collect();
        if !users.is_empty() {
            lines.push(format!("**{}**: {}", role.name, mentions(users.into_iter())));
        }
    }

    let mut orphaned: Vec<&str> = Vec::new();
    for entry in waitlist {
        let known = roles.iter().any(|r| r.name == entry.role_name);
        if !known && !orphaned.contains(&entry.role_name.as_str()) {
            orphaned.push(entry.role_name.as_str());
        }
    }
    for name in orphaned {
        let users = waitlist
            .iter()
            .filter(|w| w.role_name == name)
            .map(|w| &w.user_id);
        lines.push(format!("**{}**: {} (role unavailable)", name, mentions(users)));
    }

    lines.join("\n")
}

pub fn roster_embed(snapshot: &RosterSnapshot, tz: Tz) -> Embed {
    let event = &snapshot.event;
    let start = if event.is_scheduled() {
        format!("{} ({})", format_local_time(event.starts_at, tz), tz)
    } else {
        "Not set".to_string()
    };

    let mut fields = vec![
        EmbedField {
            name: "Start".to_string(),
            value: start,
            inline: true,
        },
        EmbedField {
            name: "Limit".to_string(),
            value: format!("{}/{}", snapshot.signups.len(), event.max_participants),
            inline: true,
        },
    ];
    if !event.comment.is_empty() {
        fields.push(EmbedField {
            name: "Comment".to_string(),
            value: event.comment.clone(),
            inline: false,
        });
    }
    let roster = roster_lines(&snapshot.roles, &snapshot.signups);
    fields.push(EmbedField {
        name: "Roster".to_string(),
        value: if roster.is_empty() { EMPTY.to_string() } else { roster },
        inline: false,
    });
    let waitlist = waitlist_lines(&snapshot.roles, &snapshot.waitlist);
    if !waitlist.is_empty() {
        fields.push(EmbedField {
            name: "Waitlist".to_string(),
            value: waitlist,
            inline: false,
        });
    }

    Embed {
        title: event.name.clone(),
        color: Some(ROSTER_COLOR),
        fields,
        footer: Some(format!("Event ID: {}", event.id)),
    }
}

pub fn roster_message(snapshot: &RosterSnapshot, tz: Tz) -> OutgoingMessage {
    OutgoingMessage {
        content: None,
        embed: Some(roster_embed(snapshot, tz)),
        view: Some(SignupView {
            event_id: snapshot.event.id,
            roles: snapshot
                .roles
                .iter()
                .map(|r| (r.name.clone(), r.capacity))
                .collect(),
        }),
    }
}

pub fn reminder_notice(event: &Event, offset_seconds: i64, tz: Tz) -> OutgoingMessage {
    let lead = format_offset(offset_seconds);
    let text = if event.is_scheduled() {
        format!(
            "Raid **{}** starts in {}! Start: {}.",
            event.name,
            lead,
            format_local_time(event.starts_at, tz)
        )
    } else {
        format!("Raid **{}** starts soon (in {}).", event.name, lead)
    };
    OutgoingMessage::text(text)
}

pub fn promotion_notice(event: &Event, promotions: &[(i64, String)]) -> OutgoingMessage {
    let who = promotions
        .iter()
        .map(|(user_id, role)| format!("<@{}> ({})", user_id, role))
        .collect::<Vec<_>>()
        .join(", ");
    OutgoingMessage::text(format!(
        "Moved up from the waitlist for **{}**: {}.",
        event.name, who
    ))
}

pub fn deleted_notice() -> OutgoingMessage {
    OutgoingMessage::text("(event deleted)")
}

/// `` `id` • when • name `` lines for an event listing.
pub fn upcoming_line(event: &Event, tz: Tz) -> String {
    let when = if event.is_scheduled() {
        format_local_time(event.starts_at, tz)
    } else {
        "No date".to_string()
    };
    format!("`{}` • {} • {}", event.id, when, event.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(starts_at: i64, comment: &str) -> Event {
        Event {
            id: 9,
            group_id: 1,
            channel_id: 2,
            message_id: None,
            name: "Molten Core".to_string(),
            starts_at,
            comment: comment.to_string(),
            max_participants: 3,
            created_by: 5,
            created_at: 0,
            reminder_offsets: String::new(),
        }
    }

    fn role(name: &str, capacity: i64) -> Role {
        Role {
            event_id: 9,
            name: name.to_string(),
            capacity,
            position: 0,
        }
    }

    fn signup(user_id: i64, role: &str) -> Signup {
        Signup {
            id: user_id,
            event_id: 9,
            user_id,
            role_name: role.to_string(),
            created_at: user_id,
        }
    }

    fn waiting(user_id: i64, role: &str) -> WaitlistEntry {
        WaitlistEntry {
            id: user_id,
            event_id: 9,
            user_id,
            role_name: role.to_string(),
            created_at: user_id,
        }
    }

    #[test]
    fn roster_lines_show_fill_per_role() {
        let roles = vec![role("tank", 1), role("healer", 2)];
        let signups = vec![signup(11, "tank")];
        assert_eq!(
            roster_lines(&roles, &signups),
            "**tank** [1/1]: <@11>\n**healer** [0/2]: -"
        );
    }

    #[test]
    fn waitlist_marks_vanished_roles() {
        let roles = vec![role("tank", 1)];
        let waitlist = vec![waiting(12, "tank"), waiting(13, "bard")];
        assert_eq!(
            waitlist_lines(&roles, &waitlist),
            "**tank**: <@12>\n**bard**: <@13> (role unavailable)"
        );
    }

    #[test]
    fn embed_skips_empty_comment_and_waitlist() {
        let snapshot = RosterSnapshot {
            event: event(0, ""),
            roles: vec![role("tank", 1)],
            signups: vec![],
            waitlist: vec![],
        };
        let embed = roster_embed(&snapshot, Tz::UTC);
        let names: Vec<&str> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Start", "Limit", "Roster"]);
        assert_eq!(embed.fields[0].value, "Not set");
        assert_eq!(embed.footer.as_deref(), Some("Event ID: 9"));
    }

    #[test]
    fn reminder_mentions_lead_time_and_start() {
        let msg = reminder_notice(&event(1_766_608_200, ""), 900, Tz::UTC);
        assert_eq!(
            msg.content.as_deref(),
            Some("Raid **Molten Core** starts in 15 min! Start: 20:30 24.12.25.")
        );
    }
}
