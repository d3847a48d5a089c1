use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use image::imageops::FilterType;
use log::{debug, info};
use tokenizers::Tokenizer;

use super::{EMBEDDING_DIM, Embedder};
use crate::config::EmbedOptions;
use crate::error::{Error, Result};

/// 输入图片边长
const IMAGE_SIZE: usize = 224;
/// 文本最大 token 数量
const MAX_TOKENS: usize = 77;
/// 该模型只有这个修订版本提供了 safetensors 权重
const MODEL_REVISION: &str = "refs/pr/15";

/// CLIP ViT-B/32，图片编码器和文本编码器输出同一个 512 维空间中的向量
pub struct ClipEmbedder {
    model_id: String,
    model: ClipModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl ClipEmbedder {
    /// 下载（或从缓存读取）模型权重和分词器并加载到指定设备
    pub fn load(opts: &EmbedOptions) -> Result<Self> {
        let model_error = |e: &dyn std::fmt::Display| Error::Model {
            model: opts.model.clone(),
            reason: e.to_string(),
        };

        let device = parse_device(&opts.device).map_err(|e| model_error(&e))?;
        info!("加载模型 {}，设备: {}", opts.model, opts.device);

        let api = ApiBuilder::new()
            .with_cache_dir(opts.model_dir.clone())
            .build()
            .map_err(|e| model_error(&e))?;
        let repo = api.repo(Repo::with_revision(
            opts.model.clone(),
            RepoType::Model,
            MODEL_REVISION.to_string(),
        ));
        let weights = repo.get("model.safetensors").map_err(|e| model_error(&e))?;
        let tokenizer = repo.get("tokenizer.json").map_err(|e| model_error(&e))?;
        debug!("模型权重: {}", weights.display());

        let tokenizer = Tokenizer::from_file(tokenizer).map_err(|e| model_error(&e))?;

        let config = ClipConfig::vit_base_patch32();
        // SAFETY: 权重文件在加载期间不会被修改
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
            .map_err(|e| model_error(&e))?;
        let model = ClipModel::new(vb, &config).map_err(|e| model_error(&e))?;

        info!("模型加载完成");

        Ok(Self { model_id: opts.model.clone(), model, tokenizer, device })
    }

    fn load_image(&self, path: &Path) -> Result<Tensor> {
        let size = IMAGE_SIZE as u32;
        let img = image::ImageReader::open(path)
            .map_err(|e| Error::embedding(path.display(), e))?
            .with_guessed_format()
            .map_err(|e| Error::embedding(path.display(), e))?
            .decode()
            .map_err(|e| Error::embedding(path.display(), e))?
            .resize_to_fill(size, size, FilterType::Triangle)
            .to_rgb8()
            .into_raw();

        // 像素值缩放到 [-1, 1]
        let tensor = Tensor::from_vec(img, (IMAGE_SIZE, IMAGE_SIZE, 3), &Device::Cpu)
            .and_then(|t| t.permute((2, 0, 1)))
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.affine(2. / 255., -1.))
            .and_then(|t| t.unsqueeze(0))
            .and_then(|t| t.to_device(&self.device))
            .map_err(|e| Error::embedding(path.display(), e))?;
        Ok(tensor)
    }

    fn tokenize(&self, text: &str) -> Result<Tensor> {
        let encoding =
            self.tokenizer.encode(text, true).map_err(|e| Error::embedding(text, e))?;
        let mut ids = encoding.get_ids().to_vec();
        if ids.len() > MAX_TOKENS {
            // 文本特征取自结束符所在位置，截断后需保留结束符
            let eos = ids[ids.len() - 1];
            ids.truncate(MAX_TOKENS);
            ids[MAX_TOKENS - 1] = eos;
        }
        Tensor::new(vec![ids], &self.device).map_err(|e| Error::embedding(text, e))
    }
}

impl Embedder for ClipEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let pixels = self.load_image(path)?;
        self.model
            .get_image_features(&pixels)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| Error::embedding(path.display(), e))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let input_ids = self.tokenize(text)?;
        self.model
            .get_text_features(&input_ids)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| Error::embedding(text, e))
    }
}

/// 解析设备名：cpu、cuda、cuda:N
pub fn parse_device(s: &str) -> candle_core::Result<Device> {
    match s {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Device::new_cuda(0),
        _ => match s.strip_prefix("cuda:").and_then(|n| n.parse::<usize>().ok()) {
            Some(ordinal) => Device::new_cuda(ordinal),
            None => Err(candle_core::Error::Msg(format!("无效的设备: {}", s))),
        },
    }
}
