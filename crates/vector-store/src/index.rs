use crate::embeddings::normalize;
use crate::error::{Result, VectorStoreError};
use context_code_scanner::EntityId;
use ndarray::{ArrayView1, ArrayView2};
use std::collections::HashMap;

/// Exact cosine-similarity index over entity vectors.
///
/// Rows are stored normalized in one row-major buffer so a query is a single
/// matrix-vector product.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    ids: Vec<EntityId>,
    data: Vec<f32>,
    positions: HashMap<EntityId, usize>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert or replace the vector for `id`
    pub fn upsert(&mut self, id: EntityId, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        let mut row = vector.to_vec();
        normalize(&mut row);
        match self.positions.get(&id) {
            Some(&position) => {
                let start = position * self.dimension;
                self.data[start..start + self.dimension].copy_from_slice(&row);
            }
            None => {
                self.positions.insert(id.clone(), self.ids.len());
                self.ids.push(id);
                self.data.extend_from_slice(&row);
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &EntityId) -> bool {
        let Some(position) = self.positions.remove(id) else {
            return false;
        };
        let last = self.ids.len() - 1;
        if position != last {
            let (head, tail) = self.data.split_at_mut(last * self.dimension);
            head[position * self.dimension..(position + 1) * self.dimension]
                .copy_from_slice(&tail[..self.dimension]);
            self.ids.swap(position, last);
            self.positions.insert(self.ids[position].clone(), position);
        }
        self.ids.pop();
        self.data.truncate(last * self.dimension);
        true
    }

    /// Drop every entry whose id fails `keep`; returns how many were removed
    pub fn retain(&mut self, mut keep: impl FnMut(&EntityId) -> bool) -> usize {
        let doomed: Vec<EntityId> = self.ids.iter().filter(|id| !keep(id)).cloned().collect();
        for id in &doomed {
            self.remove(id);
        }
        doomed.len()
    }

    /// Up to `k` ids ranked by cosine similarity, ties broken by id
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(EntityId, f32)>> {
        self.check_dimension(query)?;
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let mut query = query.to_vec();
        normalize(&mut query);

        let matrix = ArrayView2::from_shape((self.ids.len(), self.dimension), &self.data)
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;
        let scores = matrix.dot(&ArrayView1::from(&query));

        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| self.ids[a.0].cmp(&self.ids[b.0])));
        ranked.truncate(k);
        Ok(ranked
            .into_iter()
            .map(|(position, score)| (self.ids[position].clone(), score))
            .collect())
    }
}
