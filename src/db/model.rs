/// 文档记录
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DocumentRecord {
    /// 文档 ID
    pub id: i64,
    /// 图片路径
    pub content: String,
    /// 内容类型，目前只有 image
    pub content_type: String,
    /// JSON 格式的元数据
    pub meta: String,
    /// f32 数组的原始字节，尚未计算时为空
    pub embedding: Option<Vec<u8>>,
}
