/// VulkanShader - Vulkan implementation of the Shader trait
///
/// One VkShaderModule per stage. Stages declared without reflection are
/// reflected from their SPIR-V with spirq before the program-wide merge.

use right_engine::right::{Error, Result};
use right_engine::right::render::{
    merge_stage_reflections, BufferFormat, BufferType, Shader, ShaderProgramDesc, ShaderReflection,
    ShaderStage, StageReflection, VertexBufferLayout, CONSTANT_BUFFER_SLOT,
};
use right_engine::{engine_bail, engine_bail_warn, engine_err, engine_error};
use ash::vk;
use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::shader_stage_to_vk;

/// One compiled stage
pub(crate) struct VulkanShaderStage {
    pub(crate) stage: vk::ShaderStageFlags,
    pub(crate) module: vk::ShaderModule,
    pub(crate) entry_point: CString,
}

/// Vulkan shader program implementation
pub struct VulkanShader {
    ctx: Arc<GpuContext>,
    name: String,
    pub(crate) stages: Vec<VulkanShaderStage>,
    reflection: ShaderReflection,
}

impl VulkanShader {
    pub(crate) fn create(ctx: &Arc<GpuContext>, desc: &ShaderProgramDesc) -> Result<Arc<Self>> {
        let mut reflections = Vec::with_capacity(desc.stages.len());
        for stage_desc in &desc.stages {
            let words = spirv_words(&stage_desc.code)?;
            let reflection = if stage_desc.reflection.is_empty() {
                reflect_stage(&words, stage_desc.stage)?
            } else {
                stage_desc.reflection.clone()
            };
            reflections.push((stage_desc.stage, reflection));
        }

        let reflection = merge_stage_reflections(&reflections).map_err(|e| {
            engine_error!("right::vulkan", "Shader '{}': {}", desc.name, e);
            e
        })?;

        let mut shader = Self {
            ctx: Arc::clone(ctx),
            name: desc.name.clone(),
            stages: Vec::with_capacity(desc.stages.len()),
            reflection,
        };

        for stage_desc in &desc.stages {
            let words = spirv_words(&stage_desc.code)?;
            let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
            let module = unsafe {
                ctx.device.create_shader_module(&create_info, None)
                    .map_err(|e| engine_err!("right::vulkan",
                        "Failed to create {:?} shader module of '{}': {:?}", stage_desc.stage, desc.name, e))?
            };
            let entry_point = CString::new(stage_desc.entry_point.as_str())
                .map_err(|_| Error::InvalidResource(format!("entry point '{}' contains a NUL byte", stage_desc.entry_point)))?;

            shader.stages.push(VulkanShaderStage {
                stage: shader_stage_to_vk(stage_desc.stage),
                module,
                entry_point,
            });
        }

        Ok(Arc::new(shader))
    }
}

impl Shader for VulkanShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            for stage in &self.stages {
                self.ctx.device.destroy_shader_module(stage.module, None);
            }
        }
    }
}

/// Reinterpret SPIR-V bytes as little-endian words
fn spirv_words(code: &[u8]) -> Result<Vec<u32>> {
    if code.is_empty() || code.len() % 4 != 0 {
        engine_bail_warn!("right::vulkan",
            "Shader code not 4-byte aligned (size: {} bytes)", code.len());
    }
    Ok(code
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

/// Parse SPIR-V bytecode and extract the bindings of one stage using spirq
fn reflect_stage(code: &[u32], stage: ShaderStage) -> Result<StageReflection> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!("right::vulkan", "SPIR-V reflection failed: {:?}", e))?;

    let mut reflection = StageReflection::default();
    let mut inputs: Vec<(u32, BufferFormat)> = Vec::new();

    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            match var {
                spirq::var::Variable::Descriptor { desc_bind, desc_ty, .. } => {
                    use spirq::ty::DescriptorType;
                    let slot = desc_bind.bind();
                    match desc_ty {
                        DescriptorType::UniformBuffer() => reflection.buffers.push((slot, BufferType::Uniform)),
                        DescriptorType::CombinedImageSampler() | DescriptorType::SampledImage() => {
                            reflection.textures.push(slot)
                        }
                        other => {
                            engine_bail!("right::vulkan",
                                "Unsupported SPIR-V descriptor type at binding {}: {:?}", slot, other);
                        }
                    }
                }
                spirq::var::Variable::PushConstant { .. } => {
                    reflection.buffers.push((CONSTANT_BUFFER_SLOT, BufferType::Constant));
                }
                spirq::var::Variable::Input { location, ty, .. } if stage == ShaderStage::Vertex => {
                    inputs.push((location.loc(), vertex_format(ty)?));
                }
                _ => {}
            }
        }
    }

    if !inputs.is_empty() {
        inputs.sort_by_key(|(location, _)| *location);
        inputs.dedup_by_key(|(location, _)| *location);
        reflection.vertex_layout = Some(VertexBufferLayout::new(inputs.into_iter().map(|(_, f)| f).collect()));
    }

    Ok(reflection)
}

/// Vertex attribute format of a reflected input type
fn vertex_format(ty: &spirq::ty::Type) -> Result<BufferFormat> {
    use spirq::ty::{ScalarType, Type};

    let (scalar, count) = match ty {
        Type::Scalar(scalar) => (scalar, 1),
        Type::Vector(vector) => (&vector.scalar_ty, vector.nscalar),
        other => {
            engine_bail!("right::vulkan", "Unsupported vertex input type: {:?}", other);
        }
    };

    let format = match (scalar, count) {
        (ScalarType::Float { bits: 32 }, 1) => BufferFormat::R32_SFLOAT,
        (ScalarType::Float { bits: 32 }, 2) => BufferFormat::R32G32_SFLOAT,
        (ScalarType::Float { bits: 32 }, 3) => BufferFormat::R32G32B32_SFLOAT,
        (ScalarType::Float { bits: 32 }, 4) => BufferFormat::R32G32B32A32_SFLOAT,
        (ScalarType::Integer { bits: 32, is_signed: true }, 1) => BufferFormat::R32_SINT,
        (ScalarType::Integer { bits: 32, is_signed: true }, 2) => BufferFormat::R32G32_SINT,
        (ScalarType::Integer { bits: 32, is_signed: true }, 3) => BufferFormat::R32G32B32_SINT,
        (ScalarType::Integer { bits: 32, is_signed: true }, 4) => BufferFormat::R32G32B32A32_SINT,
        (ScalarType::Integer { bits: 32, is_signed: false }, 1) => BufferFormat::R32_UINT,
        (ScalarType::Integer { bits: 32, is_signed: false }, 2) => BufferFormat::R32G32_UINT,
        (ScalarType::Integer { bits: 32, is_signed: false }, 3) => BufferFormat::R32G32B32_UINT,
        (ScalarType::Integer { bits: 32, is_signed: false }, 4) => BufferFormat::R32G32B32A32_UINT,
        (other, n) => {
            engine_bail!("right::vulkan", "Unsupported vertex input scalar {:?} x{}", other, n);
        }
    };
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_words_little_endian() {
        let words = spirv_words(&[0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0]).unwrap();
        assert_eq!(words, vec![0x0723_0203, 1]);
    }

    #[test]
    fn test_spirv_words_rejects_unaligned_code() {
        assert!(spirv_words(&[0x03, 0x02, 0x23]).is_err());
        assert!(spirv_words(&[]).is_err());
    }
}
