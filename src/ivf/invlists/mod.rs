mod array_invlists;

pub use array_invlists::*;

use crate::kmeans::imbalance_factor;

/// 浮点向量倒排表
pub trait InvertedLists {
    /// 返回倒排表的列表数量
    fn nlist(&self) -> usize;

    /// 返回指定倒排表的元素数量
    fn list_len(&self, list_no: usize) -> usize;

    /// 返回指定倒排表中向量的 ID 列表和展平后的向量数据
    fn get_list(&self, list_no: usize) -> (&[u64], &[f32]);

    /// 往指定倒排表中添加一个元素
    fn add_entry(&mut self, list_no: usize, id: u64, code: &[f32]);

    /// 从指定倒排表中删除一个元素，返回是否存在
    fn remove_entry(&mut self, list_no: usize, id: u64) -> bool;

    /// 所有倒排表的元素总数
    fn len(&self) -> usize {
        (0..self.nlist()).map(|i| self.list_len(i)).sum()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 计算不平衡度
    fn imbalance(&self) -> f32 {
        let mut hist = Vec::with_capacity(self.nlist());
        for i in 0..self.nlist() {
            hist.push(self.list_len(i));
        }
        imbalance_factor(&hist)
    }
}
