//! Discussion navigation: the Lean Coffee queue and timebox.

use chrono::Utc;
use huddle_core::{ItemId, Phase, ServerFrame, TopicHistory, TopicHistoryId};
use tracing::info;

use super::{ClientCtx, CommandError, CommandResult, Dispatcher};

impl Dispatcher {
    /// `discuss_set_item`: discuss phase, facilitator only.
    ///
    /// For Lean Coffee this closes the current topic's history, marks it
    /// done, opens the new topic, and restarts the per-topic timebox. For
    /// a plain retro it is an advisory navigation relay.
    pub(super) async fn discuss_set_item(&self, ctx: &ClientCtx, item_id: ItemId) -> CommandResult {
        let room = Self::require_room(ctx)?;
        let handle = self.require_phase(room, Phase::Discuss).await?;
        let mut state = handle.lock().await;
        if !state.is_facilitator(ctx.user_id) {
            return Err(CommandError::forbidden("only the facilitator may drive discussion"));
        }

        let item = self.store.items.get_by_id(item_id).await?;
        if item.retro_id != room {
            return Err(CommandError::not_found("item not in this retro"));
        }

        if state.lc_state().is_some() {
            let now = Utc::now();

            // Close the outgoing topic's history segment.
            let closing = state.lc_state().and_then(|lc| {
                lc.current
                    .filter(|current| *current != item_id)
                    .zip(lc.current_since)
            });
            if let Some((current, since)) = closing {
                if let Some(row) = self.store.topic_history.find_by_topic(room, current).await? {
                    let elapsed =
                        u32::try_from((now - since).num_seconds().max(0)).unwrap_or(u32::MAX);
                    self.store
                        .topic_history
                        .update(
                            row.id,
                            row.total_discussion_seconds.saturating_add(elapsed),
                            row.extension_count,
                            Some(now),
                        )
                        .await?;
                }
                if let Some(lc) = state.lc_state_mut() {
                    lc.done.insert(current);
                }
            }

            // Open the incoming topic (creating its history row on first
            // discussion, reopening it on a revisit).
            match self.store.topic_history.find_by_topic(room, item_id).await? {
                Some(row) => {
                    self.store
                        .topic_history
                        .update(
                            row.id,
                            row.total_discussion_seconds,
                            row.extension_count,
                            None,
                        )
                        .await?;
                },
                None => {
                    let order = self.store.topic_history.next_order(room).await?;
                    self.store
                        .topic_history
                        .create(TopicHistory {
                            id: TopicHistoryId::new(),
                            retro_id: room,
                            item_id,
                            order,
                            started_at: now,
                            ended_at: None,
                            total_discussion_seconds: 0,
                            extension_count: 0,
                        })
                        .await?;
                },
            }

            let items = self.store.items.list_by_retro(room).await?;
            if let Some(lc) = state.lc_state_mut() {
                lc.done.remove(&item_id);
                lc.current = Some(item_id);
                lc.current_since = Some(now);
                lc.rebuild_queue(&items);
            }
            info!(room = %room, item_id = %item_id, "Lean Coffee topic changed");

            // Restart the per-topic timebox when the template configures
            // one for the discuss phase.
            let template_id = state.template_id;
            if let Ok(template) = self.store.templates.get_by_id(template_id).await {
                if let Some(duration) =
                    template.phase_timers.get(&Phase::Discuss).copied().filter(|d| *d > 0)
                {
                    let started_at = Utc::now();
                    let ends_at = state.timer.start(started_at, duration);
                    let timer = state.timer;
                    drop(state);
                    self.persist_timer(room, &timer).await?;
                    self.bridge
                        .broadcast_to_room(
                            room,
                            &ServerFrame::TimerStarted {
                                started_at,
                                duration_seconds: duration,
                                ends_at,
                            },
                        )
                        .await;
                    self.bridge
                        .broadcast_to_room(room, &ServerFrame::DiscussItemChanged { item_id })
                        .await;
                    return Ok(());
                }
            }
        }

        drop(state);
        self.bridge
            .broadcast_to_room(room, &ServerFrame::DiscussItemChanged { item_id })
            .await;
        Ok(())
    }

    /// `discuss_extend`: add time to the current Lean Coffee timebox and
    /// count the extension on the topic's history.
    pub(super) async fn discuss_extend(&self, ctx: &ClientCtx, seconds: u32) -> CommandResult {
        if seconds == 0 {
            return Err(CommandError::invalid_payload("seconds must be positive"));
        }
        let room = Self::require_room(ctx)?;
        let handle = self.require_phase(room, Phase::Discuss).await?;
        let mut state = handle.lock().await;
        if !state.is_facilitator(ctx.user_id) {
            return Err(CommandError::forbidden("only the facilitator may extend the timebox"));
        }
        let Some(current) = state.lc_state().and_then(|lc| lc.current) else {
            return Err(CommandError::phase_invalid("no topic under discussion"));
        };

        let (ends_at, remaining_seconds) = state.timer.add_time(seconds)?;
        let timer = state.timer;
        drop(state);
        self.persist_timer(room, &timer).await?;

        if let Some(row) = self.store.topic_history.find_by_topic(room, current).await? {
            self.store
                .topic_history
                .update(
                    row.id,
                    row.total_discussion_seconds,
                    row.extension_count.saturating_add(1),
                    row.ended_at,
                )
                .await?;
        }

        self.bridge
            .broadcast_to_room(
                room,
                &ServerFrame::TimerUpdated { ends_at, remaining_seconds },
            )
            .await;
        Ok(())
    }
}
