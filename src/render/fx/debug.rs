//! 调试叠加层
//!
//! [`DebugCanvas`] 是 2D 绘制表面的不透明替身：特效系统只向其中写入
//! 定位文本行，由调用方的文本渲染器消费。叠加层仅用于诊断，对正确性
//! 没有任何影响。

use glam::Vec2;

/// 一行调试文本
#[derive(Debug, Clone)]
pub struct DebugLine {
    /// 屏幕位置
    pub position: Vec2,
    /// 文本内容
    pub text: String,
    /// 颜色
    pub color: [f32; 4],
}

/// 调试文本收集画布
#[derive(Debug, Default)]
pub struct DebugCanvas {
    lines: Vec<DebugLine>,
}

impl DebugCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一行文本
    pub fn draw_text(&mut self, position: Vec2, text: impl Into<String>, color: [f32; 4]) {
        self.lines.push(DebugLine {
            position,
            text: text.into(),
            color,
        });
    }

    /// 已收集的文本行
    pub fn lines(&self) -> &[DebugLine] {
        &self.lines
    }

    /// 清空（帧驱动方每帧调用）
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_collects_lines() {
        let mut canvas = DebugCanvas::new();
        canvas.draw_text(Vec2::new(8.0, 8.0), "emitters: 3", [1.0; 4]);
        assert_eq!(canvas.lines().len(), 1);
        assert_eq!(canvas.lines()[0].text, "emitters: 3");
        canvas.clear();
        assert!(canvas.lines().is_empty());
    }
}
