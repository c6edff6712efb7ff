//! Assembly of the authoritative `retro_state` snapshot.

use std::sync::Arc;

use chrono::Utc;
use huddle_cluster::ClusterBridge;
use huddle_core::{
    Phase, Retro, RetroId, RetroStatePayload, RotiResults, TeamId, TeamMemberStatus, UserId,
};
use huddle_session::SessionHandle;
use huddle_store::Store;

use crate::dispatcher::CommandError;

/// Build the snapshot a joining client reconciles against.
///
/// The in-memory mirror overrides the persisted row for the transient
/// fields (phase, facilitator, timer): it is what this replica is
/// actually serving.
pub(crate) async fn build(
    store: &Store,
    bridge: &Arc<ClusterBridge>,
    handle: &SessionHandle,
    retro: &Retro,
    user: UserId,
) -> Result<RetroStatePayload, CommandError> {
    let items = store.items.list_by_retro(retro.id).await?;
    let actions = store.actions.list_by_retro(retro.id).await?;
    let moods = store.moods.list_by_retro(retro.id).await?;
    let roti = mask_unrevealed(store.roti.results(retro.id).await?);
    let participants = bridge.room_participants(retro.id).await;
    let user_vote_count = store.votes.count_by_user_in_retro(retro.id, user).await?;

    let (phase, retro_out, discussion) = {
        let mut state = handle.lock().await;
        let mut retro_out = retro.clone();
        retro_out.phase = state.phase;
        retro_out.facilitator_id = state.facilitator;
        let columns = state.timer.to_columns(Utc::now());
        retro_out.timer_started_at = columns.started_at;
        retro_out.timer_duration_seconds = columns.duration_seconds;
        retro_out.timer_paused_at = columns.paused_at;
        retro_out.timer_remaining_seconds = columns.remaining_seconds;

        let phase = state.phase;
        let discussion = state.lc_state_mut().map(|lc| {
            lc.rebuild_queue(&items);
            lc.snapshot()
        });
        (phase, retro_out, discussion)
    };

    let team_members = if phase == Phase::Waiting {
        Some(team_member_statuses(store, bridge, retro.id, retro.team_id).await?)
    } else {
        None
    };

    Ok(RetroStatePayload {
        retro: retro_out,
        items,
        actions,
        moods,
        roti,
        participants,
        user_vote_count,
        team_members,
        discussion,
    })
}

/// The waiting-phase roster: every team member with a live presence flag.
pub(crate) async fn team_member_statuses(
    store: &Store,
    bridge: &Arc<ClusterBridge>,
    room: RetroId,
    team: TeamId,
) -> Result<Vec<TeamMemberStatus>, CommandError> {
    let members = store.team_members.list_by_team(team).await?;
    let present = bridge.room_participants(room).await;
    Ok(members
        .into_iter()
        .map(|member| TeamMemberStatus {
            present: present.iter().any(|p| p.user_id == member.user_id),
            user_id: member.user_id,
            user_name: member.user_name,
            role: member.role,
        })
        .collect())
}

/// Unrevealed ROTI results leak nothing but the vote count.
fn mask_unrevealed(results: RotiResults) -> RotiResults {
    if results.revealed {
        results
    } else {
        RotiResults {
            total_votes: results.total_votes,
            ..RotiResults::empty()
        }
    }
}
