use sqlx::FromRow;

use crate::types::ItemRecord;

/// 条目记录
#[derive(Debug, FromRow)]
pub struct ItemRow {
    /// 条目 ID
    pub id: String,
    /// 写入序号，重建索引时按此顺序写入
    pub seq: i64,
    /// 向量维度
    pub dim: i64,
    /// 小端序 f32 数组
    pub vector: Vec<u8>,
    pub source: Option<String>,
    pub created_at: i64,
}

impl ItemRow {
    /// 解码向量
    pub fn embedding(&self) -> Vec<f32> {
        // Vec<u8> 不保证 f32 对齐，需要复制
        bytemuck::pod_collect_to_vec(&self.vector)
    }
}

impl From<ItemRow> for ItemRecord {
    fn from(row: ItemRow) -> Self {
        ItemRecord {
            embedding: row.embedding(),
            id: row.id,
            source: row.source,
            created_at: row.created_at,
        }
    }
}

/// 编码向量
pub fn encode_embedding(v: &[f32]) -> &[u8] {
    bytemuck::cast_slice(v)
}
