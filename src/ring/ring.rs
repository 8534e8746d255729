use rand::Rng;

/// Number of slots on the ring.
pub const RING_SLOTS: usize = 512;
/// Virtual slots per server.
pub const VIRTUAL_SLOTS: u32 = 9;

const HASH_BASE: i64 = 31;
const HASH_MOD: i64 = 1_000_000_007;

/// Polynomial rolling hash of a server name.
pub fn string_hash(s: &str) -> i64 {
    let mut res: i64 = 0;
    let mut p: i64 = 1;
    for c in s.chars() {
        res = res.wrapping_add((c as i64).wrapping_mul(p) % HASH_MOD);
        p = p.wrapping_mul(HASH_BASE);
    }
    res
}

fn mix(mut i: u32) -> u32 {
    i = ((i >> 16) ^ i).wrapping_mul(0x45d9f3b);
    i = ((i >> 16) ^ i).wrapping_mul(0x45d9f3b);
    (i >> 16) ^ i
}

/// Secondary hash placing virtual slot `j` of a server whose name hashes to `i`.
pub fn slot_hash(i: u32, j: u32) -> u32 {
    mix(i.wrapping_add(mix(j)))
}

/// Candidate slot of virtual node `j` for `server`.
fn candidate(server: &str, j: u32) -> usize {
    slot_hash(string_hash(server) as u32, j) as usize % RING_SLOTS
}

#[derive(Debug, Clone)]
pub struct HashRing {
    slots: Vec<Option<String>>,
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new()
    }
}

impl HashRing {
    pub fn new() -> Self {
        Self {
            slots: vec![None; RING_SLOTS],
        }
    }

    /// Places `server` at its virtual slots. Returns how many were placed,
    /// which is less than [`VIRTUAL_SLOTS`] only when the ring is full.
    pub fn insert(&mut self, server: &str) -> usize {
        let mut placed = 0;
        for j in 0..VIRTUAL_SLOTS {
            let pos = candidate(server, j);
            match self.probe(pos, |slot| slot.is_none()) {
                Some(free) => {
                    self.slots[free] = Some(server.to_string());
                    placed += 1;
                }
                None => {
                    tracing::warn!("Hash ring full, virtual slot {} of {} not placed", j, server);
                }
            }
        }
        placed
    }

    /// Clears the slots holding `server`, following the same probe sequence
    /// used on insert. Slots owned by other servers are never touched.
    pub fn remove(&mut self, server: &str) -> usize {
        let mut cleared = 0;
        for j in 0..VIRTUAL_SLOTS {
            let pos = candidate(server, j);
            if let Some(found) = self.probe(pos, |slot| slot.as_deref() == Some(server)) {
                self.slots[found] = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Picks a server starting from a random slot.
    pub fn pick(&self) -> Option<&str> {
        let start = rand::thread_rng().gen_range(0..RING_SLOTS);
        self.pick_from(start)
    }

    /// First occupied slot scanning forward (wrapping) from `start`.
    pub fn pick_from(&self, start: usize) -> Option<&str> {
        let start = start % RING_SLOTS;
        self.probe(start, |slot| slot.is_some())
            .and_then(|pos| self.slots[pos].as_deref())
    }

    pub fn contains(&self, server: &str) -> bool {
        self.slots.iter().any(|slot| slot.as_deref() == Some(server))
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn slots_of(&self, server: &str) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_deref() == Some(server))
            .map(|(pos, _)| pos)
            .collect()
    }

    fn probe(&self, start: usize, matches: impl Fn(&Option<String>) -> bool) -> Option<usize> {
        (0..RING_SLOTS)
            .map(|offset| (start + offset) % RING_SLOTS)
            .find(|&pos| matches(&self.slots[pos]))
    }
}
