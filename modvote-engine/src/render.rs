//! Vote message rendering
//!
//! Produces the content and buttons of the escalation vote message plus the
//! plain-text notices posted when an escalation resolves.

use chrono::{DateTime, Utc};
use modvote_common::events::ResolutionTrigger;
use modvote_common::human_time::format_elapsed;
use modvote_common::{Escalation, Resolution, VotingStrategy};

use crate::gateway::{Button, ButtonStyle, OutgoingMessage};
use crate::interactions::CommandId;
use crate::tally::Tally;

/// Which vote buttons are clickable
#[derive(Debug, Clone, PartialEq, Eq)]
enum ButtonMode {
    Open,
    /// Quorum reached on a tie: only the tied options stay clickable
    Tiebreaker(Vec<Resolution>),
    Closed,
}

/// Vote message for the current state of an escalation
pub fn render_vote_message(escalation: &Escalation, tally: &Tally) -> OutgoingMessage {
    let mode = if escalation.is_resolved() {
        ButtonMode::Closed
    } else {
        ButtonMode::Open
    };
    build(escalation, tally, mode)
}

/// Vote message after a simple-strategy quorum landed on a tie
pub fn render_tiebreaker(escalation: &Escalation, tally: &Tally) -> OutgoingMessage {
    build(
        escalation,
        tally,
        ButtonMode::Tiebreaker(tally.tied_resolutions.clone()),
    )
}

fn build(escalation: &Escalation, tally: &Tally, mode: ButtonMode) -> OutgoingMessage {
    let mut lines = vec![
        format!("**Escalation vote** for <@{}>", escalation.reported_user_id),
        status_line(escalation, tally),
    ];

    lines.extend(vote_lines(tally));

    if !escalation.is_resolved() {
        lines.push(format!(
            "Auto-resolves <t:{}:R>",
            escalation.scheduled_for.timestamp()
        ));
    }

    OutgoingMessage {
        content: lines.join("\n"),
        buttons: buttons(escalation, tally, &mode),
    }
}

fn status_line(escalation: &Escalation, tally: &Tally) -> String {
    if let Some(resolution) = escalation.resolution {
        return format!("Resolved: **{}**", resolution.label());
    }

    let quorum = escalation.quorum() as usize;
    let tied = join_labels(&tally.tied_resolutions);

    match escalation.voting_strategy {
        VotingStrategy::Simple => {
            if tally.total_votes == 0 {
                format!(
                    "No votes yet. {} votes for one option resolve this early.",
                    quorum
                )
            } else if tally.is_tied && tally.leader_count >= quorum {
                format!("Quorum reached but tied between {}. Break the tie to resolve.", tied)
            } else if tally.is_tied {
                format!(
                    "Tied between {} at {} each, {} needed.",
                    tied, tally.leader_count, quorum
                )
            } else if tally.leader_count >= quorum {
                format!("Quorum reached for **{}**.", leader_label(tally))
            } else {
                format!(
                    "**{}** leads with {}/{} votes.",
                    leader_label(tally),
                    tally.leader_count,
                    quorum
                )
            }
        }
        VotingStrategy::Majority => {
            if tally.total_votes == 0 {
                "Majority vote: no votes yet. The leading option wins at the deadline.".to_string()
            } else if tally.is_tied {
                format!(
                    "Majority vote: tied between {}. A tie at the deadline resolves as Track.",
                    tied
                )
            } else {
                format!(
                    "Majority vote: **{}** leads with {} votes.",
                    leader_label(tally),
                    tally.leader_count
                )
            }
        }
    }
}

fn leader_label(tally: &Tally) -> &'static str {
    tally.leader.map_or("none", |r| r.label())
}

fn join_labels(resolutions: &[Resolution]) -> String {
    resolutions
        .iter()
        .map(|r| r.label())
        .collect::<Vec<_>>()
        .join(", ")
}

fn vote_lines(tally: &Tally) -> Vec<String> {
    Resolution::ALL
        .iter()
        .filter_map(|resolution| {
            let voters = tally.voters(*resolution)?;
            let mentions: Vec<String> = voters.iter().map(|v| format!("<@{}>", v)).collect();
            Some(format!(
                "{} ({}): {}",
                resolution.label(),
                voters.len(),
                mentions.join(", ")
            ))
        })
        .collect()
}

fn style_for(resolution: Resolution) -> ButtonStyle {
    match resolution {
        Resolution::Track => ButtonStyle::Secondary,
        Resolution::Timeout | Resolution::Restrict => ButtonStyle::Primary,
        Resolution::Kick | Resolution::Ban => ButtonStyle::Danger,
    }
}

fn buttons(escalation: &Escalation, tally: &Tally, mode: &ButtonMode) -> Vec<Button> {
    let id = escalation.id.as_str();

    let mut buttons: Vec<Button> = Resolution::ALL
        .iter()
        .map(|resolution| {
            let count = tally.count(*resolution);
            let label = if count > 0 {
                format!("{} ({})", resolution.label(), count)
            } else {
                resolution.label().to_string()
            };
            let disabled = match mode {
                ButtonMode::Open => false,
                ButtonMode::Tiebreaker(tied) => !tied.contains(resolution),
                ButtonMode::Closed => true,
            };

            Button {
                custom_id: CommandId::Vote {
                    escalation_id: id.to_string(),
                    resolution: *resolution,
                }
                .encode(),
                label,
                style: style_for(*resolution),
                disabled,
            }
        })
        .collect();

    let controls_disabled = *mode != ButtonMode::Open;

    buttons.push(Button {
        custom_id: CommandId::Expedite {
            escalation_id: id.to_string(),
        }
        .encode(),
        label: "Expedite".to_string(),
        style: ButtonStyle::Success,
        disabled: controls_disabled,
    });

    if escalation.voting_strategy == VotingStrategy::Simple {
        buttons.push(Button {
            custom_id: CommandId::Escalate {
                escalation_id: id.to_string(),
                level: 1,
            }
            .encode(),
            label: "Require majority".to_string(),
            style: ButtonStyle::Secondary,
            disabled: controls_disabled,
        });
    }

    buttons
}

fn trigger_text(trigger: ResolutionTrigger) -> &'static str {
    match trigger {
        ResolutionTrigger::Quorum => "quorum reached",
        ResolutionTrigger::Timeout => "deadline passed",
        ResolutionTrigger::Expedite => "expedited",
        ResolutionTrigger::MemberGone => "member gone",
    }
}

fn tally_summary(tally: &Tally) -> String {
    if tally.total_votes == 0 {
        return "no votes".to_string();
    }

    tally
        .by_resolution
        .iter()
        .map(|group| format!("{} {}", group.resolution.label(), group.voters.len()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Notice posted after a successful resolution
///
/// `actor` names the moderator who expedited, if any.
pub fn render_resolution_notice(
    escalation: &Escalation,
    resolution: Resolution,
    trigger: ResolutionTrigger,
    tally: &Tally,
    resolved_at: DateTime<Utc>,
    actor: Option<&str>,
) -> OutgoingMessage {
    let elapsed = format_elapsed((resolved_at - escalation.created_at).num_seconds());

    let mut content = format!(
        "Escalation for <@{}> resolved as **{}** ({}) after {}.\nFinal tally: {}",
        escalation.reported_user_id,
        resolution.label(),
        trigger_text(trigger),
        elapsed,
        tally_summary(tally)
    );

    if let Some(moderator) = actor {
        content.push_str(&format!("\nExpedited by <@{}>", moderator));
    }

    OutgoingMessage::text(content)
}

/// Notice posted when the reported member can no longer be acted on
///
/// `account_exists` separates "left the guild" from "account deleted".
pub fn render_departed_notice(escalation: &Escalation, account_exists: bool) -> OutgoingMessage {
    let what = if account_exists {
        "left the server"
    } else {
        "cannot be found, account no longer exists"
    };

    OutgoingMessage::text(format!(
        "<@{}> {} before this escalation could be acted on. Recorded as **{}**, no action taken.",
        escalation.reported_user_id,
        what,
        Resolution::Track.label()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::tally;
    use crate::testing::sample_escalation;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn enabled_votes(message: &OutgoingMessage) -> Vec<String> {
        message
            .buttons
            .iter()
            .filter(|b| b.custom_id.starts_with("vote|") && !b.disabled)
            .map(|b| b.custom_id.clone())
            .collect()
    }

    #[test]
    fn test_open_message_has_all_controls() {
        let esc = sample_escalation("e1", t0());
        let message = render_vote_message(&esc, &tally(std::iter::empty()));

        assert_eq!(message.buttons.len(), 7);
        assert!(message.buttons.iter().all(|b| !b.disabled));
        assert!(message.content.contains("No votes yet. 3 votes"));
        assert!(message
            .content
            .contains(&format!("<t:{}:R>", esc.scheduled_for.timestamp())));
    }

    #[test]
    fn test_vote_lines_mention_voters() {
        let esc = sample_escalation("e1", t0());
        let message = render_vote_message(&esc, &tally([("a", Resolution::Ban), ("b", Resolution::Ban)]));

        assert!(message.content.contains("Ban (2): <@a>, <@b>"));
        assert!(!message.content.contains("Kick ("));
        assert!(message.content.contains("**Ban** leads with 2/3 votes."));
    }

    #[test]
    fn test_majority_has_no_escalate_button() {
        let mut esc = sample_escalation("e1", t0());
        esc.voting_strategy = VotingStrategy::Majority;
        let message = render_vote_message(&esc, &tally([("a", Resolution::Kick), ("b", Resolution::Ban)]));

        assert_eq!(message.buttons.len(), 6);
        assert!(message.content.starts_with("**Escalation vote**"));
        assert!(message.content.contains("Majority vote: tied between Kick, Ban"));
    }

    #[test]
    fn test_resolved_disables_everything() {
        let mut esc = sample_escalation("e1", t0());
        esc.resolved_at = Some(t0());
        esc.resolution = Some(Resolution::Ban);

        let message = render_vote_message(&esc, &tally([("a", Resolution::Ban)]));
        assert!(message.buttons.iter().all(|b| b.disabled));
        assert!(message.content.contains("Resolved: **Ban**"));
        assert!(!message.content.contains("Auto-resolves"));
    }

    #[test]
    fn test_tiebreaker_enables_only_tied_votes() {
        let mut esc = sample_escalation("e1", t0());
        esc.flags.quorum = 2;
        let votes = tally([
            ("a", Resolution::Kick),
            ("b", Resolution::Kick),
            ("a", Resolution::Ban),
            ("c", Resolution::Ban),
        ]);

        let message = render_tiebreaker(&esc, &votes);
        assert_eq!(enabled_votes(&message), vec!["vote|e1|kick", "vote|e1|ban"]);
        assert!(message.content.contains("Quorum reached but tied between Kick, Ban"));
    }

    #[test]
    fn test_resolution_notice() {
        let esc = sample_escalation("e1", t0());
        let votes = tally([("a", Resolution::Ban), ("b", Resolution::Ban), ("c", Resolution::Kick)]);

        let notice = render_resolution_notice(
            &esc,
            Resolution::Ban,
            ResolutionTrigger::Expedite,
            &votes,
            t0() + Duration::minutes(125),
            Some("mod1"),
        );

        assert!(notice.buttons.is_empty());
        assert!(notice.content.contains("resolved as **Ban** (expedited) after 2h 5m"));
        assert!(notice.content.contains("Final tally: Ban 2, Kick 1"));
        assert!(notice.content.contains("Expedited by <@mod1>"));
    }

    #[test]
    fn test_departed_notices_differ() {
        let esc = sample_escalation("e1", t0());

        let left = render_departed_notice(&esc, true);
        let gone = render_departed_notice(&esc, false);

        assert!(left.content.contains("left the server"));
        assert!(gone.content.contains("account no longer exists"));
        assert_ne!(left.content, gone.content);
    }
}
