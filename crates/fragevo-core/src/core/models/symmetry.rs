/// A group of vertex IDs treated as interchangeable when mirroring
/// structural edits across symmetric branches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymmetricSet {
    ids: Vec<i64>,
}

impl SymmetricSet {
    pub fn new(ids: Vec<i64>) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.add(id);
        }
        set
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn contains(&self, vertex_id: i64) -> bool {
        self.ids.contains(&vertex_id)
    }

    pub fn add(&mut self, vertex_id: i64) {
        if !self.ids.contains(&vertex_id) {
            self.ids.push(vertex_id);
        }
    }

    pub fn remove(&mut self, vertex_id: i64) {
        self.ids.retain(|&id| id != vertex_id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
