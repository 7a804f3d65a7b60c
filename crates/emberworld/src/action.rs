//! Game-action tracking: movement issue, ack, cancel, and map transitions.

use anyhow::anyhow;
use chrono::Utc;
use emberproto::msgcli::GameActionCli;
use emberproto::msgsvr::{GameActions, MsgSvr};
use emberproto::typ::{DirAndCell, GameMovementSprite};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::map::validated_path;
use crate::repository::RepoError;
use crate::session::{MovementAction, Session};

impl Session {
    pub async fn handle_game_actions(&mut self, action: GameActionCli) -> SessionResult<()> {
        match action {
            GameActionCli::Movement { legs } => self.action_movement(&legs).await,
            GameActionCli::Challenge { challenged_id } => {
                self.action_challenge(challenged_id).await
            }
            GameActionCli::ChallengeAccept { .. } | GameActionCli::ChallengeRefuse { .. } => {
                Err(SessionError::NotImplemented)
            }
        }
    }

    async fn action_movement(&mut self, legs: &[DirAndCell]) -> SessionResult<()> {
        if legs.is_empty() {
            return Err(SessionError::InvalidRequest);
        }

        let character = self.server.repo.character(self.character_id).await?;

        let game_map = self
            .server
            .static_cache
            .game_maps
            .get(&character.game_map_id)
            .ok_or_else(|| anyhow!("game map not found"))?;

        let cells = self.server.map_cells(game_map.id).await?;

        let validated = match validated_path(legs, character.cell, game_map.width, &cells) {
            Ok(validated) => validated,
            Err(e) => {
                debug!(client_address = %self.addr, err = %e, "could not get validated path");
                self.send(MsgSvr::GameActions(GameActions::Default)).await;
                return Ok(());
            }
        };

        if validated.is_empty() {
            self.send(MsgSvr::GameActions(GameActions::Default)).await;
            return Ok(());
        }

        let mut dir_and_cells = Vec::with_capacity(validated.len() + 1);
        dir_and_cells.push(DirAndCell {
            dir: 0,
            cell: character.cell,
        });
        dir_and_cells.extend_from_slice(&validated);

        self.shared.inc_busy();
        self.game_actions.insert(0, MovementAction { legs: validated });

        self.server
            .send_to_map(
                character.game_map_id,
                MsgSvr::GameActions(GameActions::Movement {
                    id: 0,
                    sprite_id: character.id,
                    dir_and_cells,
                }),
            )
            .await?;

        Ok(())
    }

    async fn action_challenge(&mut self, challenged_id: i32) -> SessionResult<()> {
        if self.shared.busy() > 0 {
            self.send(MsgSvr::GameActions(GameActions::ChallengeJoinError {
                challenger_id: self.character_id,
                reason: 'b',
            }))
            .await;
            return Ok(());
        }

        let character = self.server.repo.character(self.character_id).await?;

        let other_character = self.server.repo.character(challenged_id).await?;

        if other_character.game_map_id != character.game_map_id {
            return Err(SessionError::InvalidRequest);
        }

        let Some(other_shared) = self
            .server
            .session_shared_by_character_id(other_character.id)
            .await
        else {
            return Err(SessionError::InvalidRequest);
        };

        if other_shared.busy() > 0 {
            self.send(MsgSvr::GameActions(GameActions::ChallengeJoinError {
                challenger_id: self.character_id,
                reason: 'o',
            }))
            .await;
            return Ok(());
        }

        self.server
            .send_to_map(
                character.game_map_id,
                MsgSvr::GameActions(GameActions::Challenge {
                    challenger_id: character.id,
                    challenged_id,
                }),
            )
            .await?;

        Ok(())
    }

    pub async fn handle_game_action_ack(&mut self, id: i32) -> SessionResult<()> {
        let Some(action) = self.game_actions.get(&id).cloned() else {
            return Err(SessionError::InvalidRequest);
        };

        let mut character = self.server.repo.character(self.character_id).await?;

        let final_leg = *action
            .legs
            .last()
            .ok_or_else(|| anyhow!("empty directions and cells"))?;

        character.cell = final_leg.cell;
        character.direction = final_leg.dir;

        self.server.repo.update_character(character.clone()).await?;

        self.game_actions.remove(&id);
        self.shared.dec_busy();

        self.send(MsgSvr::BasicsNothing).await;

        let trigger = match self
            .server
            .repo
            .trigger_by_game_map_id_and_cell_id(character.game_map_id, character.cell)
            .await
        {
            Ok(trigger) => trigger,
            Err(RepoError::NotFound) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.server
            .send_to_map(
                character.game_map_id,
                MsgSvr::GameMovementRemove { id: character.id },
            )
            .await?;

        character.game_map_id = trigger.target_game_map_id;
        character.cell = trigger.target_cell_id;

        self.server.repo.update_character(character.clone()).await?;

        self.send(MsgSvr::GameActions(GameActions::LoadGameMap {
            sprite_id: character.id,
            cinematic: 0,
        }))
        .await;

        let game_map = self
            .server
            .static_cache
            .game_maps
            .get(&character.game_map_id)
            .ok_or_else(|| anyhow!("invalid game map"))?;

        self.send(MsgSvr::GameMapData {
            id: game_map.id,
            name: game_map.name.clone(),
            key: game_map.key.clone(),
        })
        .await;

        self.send(MsgSvr::BasicsTime {
            unix_ms: Utc::now().timestamp_millis(),
        })
        .await;

        self.send(MsgSvr::FightsCount { value: 0 }).await;

        let sprite = self.server.character_sprite(&character, false).await?;
        self.server
            .send_to_map(
                character.game_map_id,
                MsgSvr::GameMovement {
                    sprites: vec![GameMovementSprite::Character(sprite)],
                },
            )
            .await?;

        Ok(())
    }

    pub async fn handle_game_action_cancel(&mut self, id: i32, params: &str) -> SessionResult<()> {
        let Some(action) = self.game_actions.get(&id).cloned() else {
            return Err(SessionError::InvalidRequest);
        };

        let cell: i32 = params
            .parse()
            .map_err(|_| SessionError::InvalidRequest)?;

        let mut character = self.server.repo.character(self.character_id).await?;

        if character.cell == cell {
            return Err(SessionError::InvalidRequest);
        }

        let target = *action
            .legs
            .last()
            .ok_or_else(|| anyhow!("empty directions and cells"))?;
        if target.cell == cell {
            return self.handle_game_action_ack(id).await;
        }

        character.cell = cell;

        self.server.repo.update_character(character).await?;

        self.game_actions.remove(&id);
        self.shared.dec_busy();

        self.send(MsgSvr::BasicsNothing).await;

        Ok(())
    }
}
