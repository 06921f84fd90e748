use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// 搜索得到的近邻，seq 为写入索引时分配的序号
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub seq: u64,
    pub distance: f32,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    /// 按距离升序，距离相同时先写入的排在前面
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance).then(self.seq.cmp(&other.seq))
    }
}

/// 保留最近的 k 个近邻
pub struct TopKNeighbors {
    heap: BinaryHeap<Neighbor>,
    k: usize,
}

impl TopKNeighbors {
    /// 堆只按实际写入的数量增长，k 可以远大于候选数量
    pub fn new(k: usize) -> Self {
        Self { heap: BinaryHeap::new(), k }
    }

    pub fn push(&mut self, neighbor: Neighbor) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(neighbor);
        } else if let Some(worst) = self.heap.peek() {
            if neighbor < *worst {
                self.heap.pop();
                self.heap.push(neighbor);
            }
        }
    }

    pub fn extend(&mut self, neighbors: impl IntoIterator<Item = Neighbor>) {
        for n in neighbors {
            self.push(n);
        }
    }

    /// 返回按距离升序排列的结果
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}
