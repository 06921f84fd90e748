use std::mem;

use super::InvertedLists;

/// 内存倒排表
pub struct ArrayInvertedLists {
    dim: usize,
    ids: Vec<Vec<u64>>,
    codes: Vec<Vec<f32>>,
}

impl ArrayInvertedLists {
    pub fn new(nlist: usize, dim: usize) -> Self {
        Self { dim, ids: vec![vec![]; nlist], codes: vec![vec![]; nlist] }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 取出所有元素并清空倒排表，用于重新划分
    pub fn take_all(&mut self) -> (Vec<u64>, Vec<f32>) {
        let mut ids = Vec::with_capacity(self.len());
        let mut codes = Vec::with_capacity(self.len() * self.dim);
        for (list_ids, list_codes) in self.ids.iter_mut().zip(self.codes.iter_mut()) {
            // 代替 clear + shrink_to_fit，直接释放内存
            ids.extend(mem::take(list_ids));
            codes.extend(mem::take(list_codes));
        }
        (ids, codes)
    }

    /// 查找元素在倒排表中的向量
    pub fn get_code(&self, list_no: usize, id: u64) -> Option<&[f32]> {
        let pos = self.ids[list_no].iter().position(|&x| x == id)?;
        Some(&self.codes[list_no][pos * self.dim..(pos + 1) * self.dim])
    }
}

impl InvertedLists for ArrayInvertedLists {
    fn nlist(&self) -> usize {
        self.ids.len()
    }

    fn list_len(&self, list_no: usize) -> usize {
        self.ids[list_no].len()
    }

    fn get_list(&self, list_no: usize) -> (&[u64], &[f32]) {
        (&self.ids[list_no], &self.codes[list_no])
    }

    fn add_entry(&mut self, list_no: usize, id: u64, code: &[f32]) {
        assert_eq!(code.len(), self.dim, "code size mismatch");
        self.ids[list_no].push(id);
        self.codes[list_no].extend_from_slice(code);
    }

    fn remove_entry(&mut self, list_no: usize, id: u64) -> bool {
        let ids = &mut self.ids[list_no];
        let Some(pos) = ids.iter().position(|&x| x == id) else {
            return false;
        };
        let last = ids.len() - 1;
        ids.swap_remove(pos);

        // 与 swap_remove 保持一致：将最后一个向量移动到被删除的位置
        let dim = self.dim;
        let codes = &mut self.codes[list_no];
        if pos != last {
            codes.copy_within(last * dim..(last + 1) * dim, pos * dim);
        }
        codes.truncate(last * dim);
        true
    }
}
