//! Mood check-in and ROTI commands.

use huddle_core::{MAX_MOOD_LEN, Phase, ServerFrame};

use super::{ClientCtx, CommandError, CommandResult, Dispatcher};

impl Dispatcher {
    /// `mood_set`: icebreaker phase; upserts the caller's mood.
    pub(super) async fn mood_set(&self, ctx: &ClientCtx, mood: String) -> CommandResult {
        let room = Self::require_room(ctx)?;
        self.require_phase(room, Phase::Icebreaker).await?;
        let mood = mood.trim().to_string();
        if mood.is_empty() || mood.len() > MAX_MOOD_LEN {
            return Err(CommandError::invalid_payload("invalid mood"));
        }

        self.store.moods.upsert(room, ctx.user_id, &mood).await?;
        let mood_count = self.store.moods.count(room).await?;
        let participant_count = participant_count(self, room).await;

        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::MoodUpdated {
                    user_id: ctx.user_id,
                    mood,
                    mood_count,
                    participant_count,
                },
            )
            .await;
        Ok(())
    }

    /// `roti_vote`: roti phase; upserts the caller's rating. Counts go
    /// out, ratings stay secret until reveal.
    pub(super) async fn roti_vote(&self, ctx: &ClientCtx, rating: u8) -> CommandResult {
        let room = Self::require_room(ctx)?;
        self.require_phase(room, Phase::Roti).await?;
        if !(1..=5).contains(&rating) {
            return Err(CommandError::invalid_payload("rating must be within 1..=5"));
        }

        self.store.roti.upsert_vote(room, ctx.user_id, rating).await?;
        let vote_count = self.store.roti.count_votes(room).await?;
        let participant_count = participant_count(self, room).await;

        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::RotiVoteSubmitted { vote_count, participant_count },
            )
            .await;
        Ok(())
    }

    /// `roti_reveal`: roti phase, facilitator only.
    pub(super) async fn roti_reveal(&self, ctx: &ClientCtx) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let handle = self.require_phase(room, Phase::Roti).await?;
        if !handle.lock().await.is_facilitator(ctx.user_id) {
            return Err(CommandError::forbidden("only the facilitator may reveal results"));
        }

        self.store.roti.reveal(room).await?;
        let results = self.store.roti.results(room).await?;
        self.bridge
            .broadcast_to_room(room, &ServerFrame::RotiResultsRevealed(results))
            .await;
        Ok(())
    }
}

async fn participant_count(dispatcher: &Dispatcher, room: huddle_core::RetroId) -> u32 {
    let participants = dispatcher.bridge.room_participants(room).await;
    u32::try_from(participants.len()).unwrap_or(u32::MAX)
}
