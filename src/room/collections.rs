//! Ordered, unique-keyed registries mapping connection identity to player
//! identity. Iteration order is ascending `cn`/`pn`, which keeps roster and
//! broadcast ordering stable across ticks.

use std::collections::btree_map::{BTreeMap, Values, ValuesMut};

use crate::player::{Client, Player};
use crate::protocol::{Cn, Pn};

#[derive(Debug, Default)]
pub struct ClientCollection {
    clients: BTreeMap<Cn, Client>,
}

impl ClientCollection {
    /// Register a client. Returns false (without replacing) when the `cn` is
    /// already taken.
    pub fn add(&mut self, client: Client) -> bool {
        if self.clients.contains_key(&client.cn) {
            return false;
        }
        self.clients.insert(client.cn, client);
        true
    }

    pub fn remove(&mut self, cn: Cn) -> Option<Client> {
        self.clients.remove(&cn)
    }

    pub fn by_cn(&self, cn: Cn) -> Option<&Client> {
        self.clients.get(&cn)
    }

    pub fn by_cn_mut(&mut self, cn: Cn) -> Option<&mut Client> {
        self.clients.get_mut(&cn)
    }

    pub fn contains(&self, cn: Cn) -> bool {
        self.clients.contains_key(&cn)
    }

    pub fn iter(&self) -> Values<'_, Cn, Client> {
        self.clients.values()
    }

    pub fn cns(&self) -> impl Iterator<Item = Cn> + '_ {
        self.clients.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PlayerCollection {
    players: BTreeMap<Pn, Player>,
}

impl PlayerCollection {
    /// Register a player. Returns false (without replacing) when the `pn` is
    /// already taken.
    pub fn add(&mut self, player: Player) -> bool {
        if self.players.contains_key(&player.pn) {
            return false;
        }
        self.players.insert(player.pn, player);
        true
    }

    pub fn remove(&mut self, pn: Pn) -> Option<Player> {
        self.players.remove(&pn)
    }

    pub fn by_pn(&self, pn: Pn) -> Option<&Player> {
        self.players.get(&pn)
    }

    pub fn by_pn_mut(&mut self, pn: Pn) -> Option<&mut Player> {
        self.players.get_mut(&pn)
    }

    pub fn iter(&self) -> Values<'_, Pn, Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> ValuesMut<'_, Pn, Player> {
        self.players.values_mut()
    }

    pub fn pns(&self) -> impl Iterator<Item = Pn> + '_ {
        self.players.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_name_duplicate(&self, name: &str) -> bool {
        self.players.values().filter(|p| p.name == name).count() > 1
    }

    /// Players currently part of the game (not spectating).
    pub fn playing_count(&self) -> usize {
        self.players
            .values()
            .filter(|p| !p.state.is_spectator())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Privilege;

    #[test]
    fn client_cns_are_unique() {
        let mut clients = ClientCollection::default();
        assert!(clients.add(Client::new(4, Privilege::None)));
        assert!(!clients.add(Client::new(4, Privilege::Admin)));
        assert_eq!(clients.len(), 1);
        assert_eq!(clients.by_cn(4).unwrap().privilege, Privilege::None);
    }

    #[test]
    fn iteration_is_ordered_by_key() {
        let mut players = PlayerCollection::default();
        for pn in [7, 2, 5] {
            players.add(Player::new(pn, pn, format!("p{pn}"), 0));
        }
        let order: Vec<_> = players.pns().collect();
        assert_eq!(order, vec![2, 5, 7]);
    }

    #[test]
    fn duplicate_name_needs_two_holders() {
        let mut players = PlayerCollection::default();
        players.add(Player::new(0, 0, "ace".into(), 0));
        assert!(!players.is_name_duplicate("ace"));
        players.add(Player::new(1, 1, "ace".into(), 0));
        assert!(players.is_name_duplicate("ace"));
    }

    #[test]
    fn remove_missing_is_none() {
        let mut players = PlayerCollection::default();
        assert!(players.remove(9).is_none());
    }
}
