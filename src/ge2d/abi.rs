//! GE2D driver ABI (`ge2d.h`, Amlogic 4.9 kernel).

use super::{BlitConfig, HwRect};

/// `enum ge2d_canvas_type`
pub(super) const CANVAS_OSD0: i32 = 0;
pub(super) const CANVAS_ALLOC: i32 = 2;
pub(super) const CANVAS_TYPE_INVALID: i32 = 3;

/// `enum ge2d_memtype_s`
pub(super) const AML_GE2D_MEM_ION: u32 = 0;
pub(super) const AML_GE2D_MEM_INVALID: u32 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl From<HwRect> for Rectangle {
    fn from(r: HwRect) -> Self {
        Self {
            x: r.x,
            y: r.y,
            w: r.w,
            h: r.h,
        }
    }
}

/// `struct ge2d_para_s`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Ge2dPara {
    pub color: u32,
    pub src1_rect: Rectangle,
    pub src2_rect: Rectangle,
    pub dst_rect: Rectangle,
    pub op: i32,
}

/// `struct src_dst_para_ex_s`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct SrcDstParaEx {
    pub canvas_index: i32,
    pub top: i32,
    pub left: i32,
    pub width: i32,
    pub height: i32,
    pub format: i32,
    pub mem_type: i32,
    pub color: i32,
    pub x_rev: u8,
    pub y_rev: u8,
    pub fill_color_en: u8,
    pub fill_mode: u8,
}

/// `struct src_key_ctrl_s`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct SrcKeyCtrl {
    pub key_enable: i32,
    pub key_color: i32,
    pub key_mask: i32,
    pub key_mode: i32,
}

/// `struct config_planes_ion_s`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct ConfigPlanesIon {
    pub addr: libc::c_ulong,
    pub w: u32,
    pub h: u32,
    pub shared_fd: i32,
}

/// `struct config_para_ex_ion_s`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct ConfigParaExIon {
    pub src_para: SrcDstParaEx,
    pub src2_para: SrcDstParaEx,
    pub dst_para: SrcDstParaEx,
    pub src_key: SrcKeyCtrl,
    pub src2_key: SrcKeyCtrl,
    pub alu_const_color: i32,
    pub src1_gb_alpha: u32,
    pub op_mode: u32,
    pub bitmask_en: u8,
    pub bytemask_only: u8,
    pub bitmask: u32,
    pub dst_xy_swap: u8,
    pub hf_init_phase: u32,
    pub hf_rpt_num: i32,
    pub hsc_start_phase_step: u32,
    pub hsc_phase_slope: i32,
    pub vf_init_phase: u32,
    pub vf_rpt_num: i32,
    pub vsc_start_phase_step: u32,
    pub vsc_phase_slope: i32,
    pub src1_vsc_phase0_always_en: u8,
    pub src1_hsc_phase0_always_en: u8,
    pub src1_hsc_rpt_ctrl: u8,
    pub src1_vsc_rpt_ctrl: u8,
    pub src_planes: [ConfigPlanesIon; 4],
    pub src2_planes: [ConfigPlanesIon; 4],
    pub dst_planes: [ConfigPlanesIon; 4],
}

/// `struct config_ge2d_para_ex_s`, memtype arm of the union (the larger
/// one, so the size matches).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct ConfigGe2dParaEx {
    pub ge2d_magic: i32,
    pub config: ConfigParaExIon,
    pub src1_mem_alloc_type: u32,
    pub src2_mem_alloc_type: u32,
    pub dst_mem_alloc_type: u32,
}

nix::ioctl_write_ptr!(ge2d_config_ex_mem, b'G', 0x04, ConfigGe2dParaEx);
nix::ioctl_write_ptr_bad!(ge2d_fill_rectangle, 0x46fd, Ge2dPara);
nix::ioctl_write_ptr_bad!(ge2d_stretch_blit, 0x46fe, Ge2dPara);

impl From<&BlitConfig> for ConfigGe2dParaEx {
    fn from(config: &BlitConfig) -> Self {
        let mut raw = ConfigGe2dParaEx::default();
        let ex = &mut raw.config;

        ex.alu_const_color = -1;
        ex.src2_para.mem_type = CANVAS_TYPE_INVALID;
        raw.src2_mem_alloc_type = AML_GE2D_MEM_INVALID;

        match config.source {
            Some(src) => {
                ex.src_para.mem_type = CANVAS_ALLOC;
                ex.src_para.format = src.format.0 as i32;
                ex.src_para.width = src.width as i32;
                ex.src_para.height = src.height as i32;
                ex.src_para.x_rev = src.mirror.horizontal as u8;
                ex.src_para.y_rev = src.mirror.vertical as u8;

                ex.src_planes[0].shared_fd = src.fd;
                ex.src_planes[0].w = src.plane_width;
                ex.src_planes[0].h = src.height;

                raw.src1_mem_alloc_type = AML_GE2D_MEM_ION;
            }
            None => {
                ex.src_para.mem_type = CANVAS_TYPE_INVALID;
                raw.src1_mem_alloc_type = AML_GE2D_MEM_INVALID;
            }
        }

        let dst = config.target;
        ex.dst_para.mem_type = CANVAS_OSD0;
        ex.dst_para.format = dst.format.0 as i32;
        ex.dst_para.width = dst.width as i32;
        ex.dst_para.height = dst.height as i32;
        ex.dst_para.x_rev = dst.reverse_x as u8;
        ex.dst_para.y_rev = dst.reverse_y as u8;
        ex.dst_planes[0].w = dst.width;
        ex.dst_planes[0].h = dst.height;
        ex.dst_xy_swap = config.swap_axes as u8;
        raw.dst_mem_alloc_type = AML_GE2D_MEM_INVALID;

        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ge2d::{Ge2dFormat, SourcePlane, TargetPlane};
    use crate::geometry::Mirror;

    #[test]
    fn test_para_layout() {
        assert_eq!(std::mem::size_of::<Ge2dPara>(), 56);
        assert_eq!(std::mem::size_of::<SrcDstParaEx>(), 36);
    }

    #[test]
    fn test_fill_config_has_no_source() {
        let config = BlitConfig {
            source: None,
            target: TargetPlane::framebuffer(480, 2562),
            swap_axes: false,
        };
        let raw = ConfigGe2dParaEx::from(&config);

        assert_eq!(raw.config.src_para.mem_type, CANVAS_TYPE_INVALID);
        assert_eq!(raw.src1_mem_alloc_type, AML_GE2D_MEM_INVALID);
        assert_eq!(raw.config.dst_para.mem_type, CANVAS_OSD0);
        assert_eq!(raw.config.dst_para.format, Ge2dFormat::S32_ARGB.0 as i32);
        assert_eq!(raw.config.dst_planes[0].w, 480);
        assert_eq!(raw.config.dst_planes[0].h, 2562);
        assert_eq!(raw.config.alu_const_color, -1);
    }

    #[test]
    fn test_blit_config_lowers_source_and_flags() {
        let config = BlitConfig {
            source: Some(SourcePlane {
                format: Ge2dFormat::S16_RGB_565,
                width: 320,
                height: 240,
                plane_width: 320,
                fd: 17,
                mirror: Mirror {
                    horizontal: true,
                    vertical: false,
                },
            }),
            target: TargetPlane {
                reverse_y: true,
                ..TargetPlane::framebuffer(480, 1708)
            },
            swap_axes: true,
        };
        let raw = ConfigGe2dParaEx::from(&config);
        let ex = &raw.config;

        assert_eq!(ex.src_para.mem_type, CANVAS_ALLOC);
        assert_eq!(ex.src_para.width, 320);
        assert_eq!((ex.src_para.x_rev, ex.src_para.y_rev), (1, 0));
        assert_eq!(ex.src_planes[0].shared_fd, 17);
        assert_eq!(raw.src1_mem_alloc_type, AML_GE2D_MEM_ION);
        assert_eq!((ex.dst_para.x_rev, ex.dst_para.y_rev), (0, 1));
        assert_eq!(ex.dst_xy_swap, 1);
    }
}
