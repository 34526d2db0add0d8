//! Connection-level event handlers.
//!
//! These operate on a client's authority (permissions, mastermode) or on
//! room-wide lists the client announces. Handlers validate fully before
//! mutating anything; a returned error means the room is unchanged and the
//! scheduling layer turns it into a denial message for the caller only.

use tracing::debug;

use super::{Room, RoomError};
use crate::gamemode::FlagSpawn;
use crate::protocol::{mastermodes, Capability, Cn, Pn};

impl Room {
    fn check_permission(&self, cn: Cn, capability: Capability) -> Result<(), RoomError> {
        let privilege = self
            .clients
            .by_cn(cn)
            .map(|c| c.privilege)
            .unwrap_or_default();
        if self.ctx.permissions.allows(cn, privilege, capability) {
            Ok(())
        } else {
            Err(RoomError::InsufficientPermissions {
                what: capability.describe(),
            })
        }
    }

    pub fn on_client_set_master_mode(&mut self, cn: Cn, mastermode: i32) -> Result<(), RoomError> {
        self.check_permission(cn, Capability::SetMasterMode)?;
        if !(mastermodes::MM_OPEN..=mastermodes::MM_PRIVATE).contains(&mastermode) {
            debug!(room = %self.name, cn, mastermode, "out-of-range mastermode");
            self.server_message_to(cn, "Mastermode out of allowed range.".to_string());
            return Ok(());
        }
        self.mastermode = mastermode;
        let masters = self.masters();
        self.broadcaster.current_masters(self.mastermode, masters);
        Ok(())
    }

    pub fn on_client_set_team(
        &mut self,
        cn: Cn,
        target_pn: Pn,
        team_name: &str,
    ) -> Result<(), RoomError> {
        self.check_permission(cn, Capability::SetTeam)?;
        if self.players.by_pn(target_pn).is_none() {
            return Err(RoomError::UnknownPlayer { pn: target_pn });
        }
        self.with_mode(|mode, ctx| mode.on_player_try_set_team(ctx, cn, target_pn, team_name));
        Ok(())
    }

    /// Validates fully, then changes nothing: actually moving players in and
    /// out of spectating is pending a product decision on who may force it.
    pub fn on_client_set_spectator(
        &mut self,
        cn: Cn,
        target_pn: Pn,
        spectating: bool,
    ) -> Result<(), RoomError> {
        self.check_permission(cn, Capability::SetSpectator)?;
        if self.players.by_pn(target_pn).is_none() {
            return Err(RoomError::UnknownPlayer { pn: target_pn });
        }
        debug!(room = %self.name, cn, target_pn, spectating, "set_spectator validated and dropped");
        Ok(())
    }

    pub fn on_client_pause_game(&mut self, cn: Cn, pause: bool) -> Result<(), RoomError> {
        self.check_permission(cn, Capability::PauseResume)?;
        if pause {
            self.pause_game();
        } else {
            self.resume_game();
        }
        Ok(())
    }

    pub fn on_client_item_list(&mut self, cn: Cn, items: &[i32]) {
        self.with_mode(|mode, ctx| mode.on_client_item_list(ctx, cn, items));
    }

    pub fn on_client_flag_list(&mut self, cn: Cn, spawns: &[FlagSpawn]) {
        self.with_mode(|mode, ctx| mode.on_client_flag_list(ctx, cn, spawns));
    }

    pub fn on_client_base_list(&mut self, cn: Cn) {
        self.with_mode(|mode, ctx| mode.on_client_base_list(ctx, cn));
    }

    // Operations below are accepted and dropped: master handoff, moderation
    // and demo recording belong to the host layer, and bots are not fielded.

    pub fn on_client_set_master(&mut self, cn: Cn, target_cn: Cn, _master: bool) {
        debug!(room = %self.name, cn, target_cn, "set_master not handled by the room engine");
    }

    pub fn on_client_kick(&mut self, cn: Cn, target_cn: Cn) {
        debug!(room = %self.name, cn, target_cn, "kick not handled by the room engine");
    }

    pub fn on_client_clear_bans(&mut self, cn: Cn) {
        debug!(room = %self.name, cn, "clear_bans not handled by the room engine");
    }

    pub fn on_client_map_vote(&mut self, cn: Cn, map_name: &str, mode_num: i32) {
        debug!(room = %self.name, cn, map_name, mode_num, "map votes are not counted");
    }

    pub fn on_client_map_crc(&mut self, cn: Cn, crc: i32) {
        debug!(room = %self.name, cn, crc, "map crc checking is not performed");
    }

    pub fn on_client_add_bot(&mut self, cn: Cn, skill: i32) {
        debug!(room = %self.name, cn, skill, "bots are not fielded");
    }

    pub fn on_client_delete_bot(&mut self, cn: Cn) {
        debug!(room = %self.name, cn, "bots are not fielded");
    }

    pub fn on_client_record_demo(&mut self, cn: Cn, _record: bool) {
        debug!(room = %self.name, cn, "demo recording is not performed");
    }

    pub fn on_client_list_demos(&mut self, cn: Cn) {
        debug!(room = %self.name, cn, "demo recording is not performed");
    }

    pub fn on_client_get_demo(&mut self, cn: Cn, demo: i32) {
        debug!(room = %self.name, cn, demo, "demo recording is not performed");
    }

    pub fn on_client_check_maps(&mut self, cn: Cn) {
        debug!(room = %self.name, cn, "map checking is not performed");
    }
}
