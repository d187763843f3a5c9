// Window + software drawing utilities.
// Visual effects provided here:
// 1) A window that shows whichever layer is visible, letterboxed to fit.
// 2) A round toggle button (red = idle, green = processing).
// 3) A tiny 5x7 bitmap font to render HUD text on top of the video.

use crate::error::Error;
use crate::types::FrameBuffer;
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};

pub struct Drawer {
    window: Window, // the on-screen window you see
    was_down: bool, // left button state last frame, for click edges
}

impl Drawer {
    /// Create a window of the given size, capped at `target_fps` updates per second.
    /// Visual: a new empty window appears with your chosen title.
    pub fn new(title: &str, width: usize, height: usize, target_fps: usize) -> Result<Self, Error> {
        let mut window = Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        window.set_target_fps(target_fps);
        Ok(Self { window, was_down: false })
    }

    /// Push the pixels for this frame to the screen.
    pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<(), Error> {
        self.window
            .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))?;
        Ok(())
    }

    /// Returns false when the user closes the window (so we can stop the loop).
    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// True while ESC is held down (we’ll exit when this is pressed).
    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }

    /// Space toggles processing, same as clicking the button.
    pub fn space_pressed_once(&self) -> bool {
        self.window.is_key_pressed(Key::Space, KeyRepeat::No)
    }

    /// Position of a left click that started since the last call, if any.
    pub fn take_click(&mut self) -> Option<(i32, i32)> {
        let down = self.window.get_mouse_down(MouseButton::Left);
        let pressed = down && !self.was_down;
        self.was_down = down;
        if !pressed {
            return None;
        }
        self.window
            .get_mouse_pos(MouseMode::Clamp)
            .map(|(x, y)| (x as i32, y as i32))
    }
}

/// Round on-screen toggle button, bottom-centre of the screen.
#[derive(Clone, Copy, Debug)]
pub struct Button {
    pub cx: i32,
    pub cy: i32,
    pub radius: i32,
}

impl Button {
    pub fn bottom_center(screen_w: usize, screen_h: usize) -> Self {
        let radius = (screen_w.min(screen_h) / 12).max(8) as i32;
        Self {
            cx: screen_w as i32 / 2,
            cy: screen_h as i32 - radius * 2,
            radius,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (dx, dy) = (x - self.cx, y - self.cy);
        dx * dx + dy * dy <= self.radius * self.radius
    }

    /// Visual: a filled disc with a thin white rim.
    pub fn draw(&self, fb: &mut FrameBuffer, color: u32) {
        fill_circle(fb, self.cx, self.cy, self.radius, 0x00_FF_FF_FF);
        fill_circle(fb, self.cx, self.cy, self.radius - 2, color);
    }
}

/* ---------- Software drawing: pixels, discs, scaling, tiny bitmap font ---------- */

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
#[inline]
fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/// Fill a disc of `radius` pixels around (cx,cy).
pub fn fill_circle(fb: &mut FrameBuffer, cx: i32, cy: i32, radius: i32, color: u32) {
    if radius <= 0 { return; }
    let r2 = radius * radius;
    for y in (cy - radius)..=(cy + radius) {
        for x in (cx - radius)..=(cx + radius) {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy <= r2 {
                put_pixel(fb, x, y, color);
            }
        }
    }
}

/// Scale `src` into `dst` keeping its aspect ratio (nearest neighbour).
/// Visual: the image is centred; unused bars are painted black.
pub fn blit_fit(src: &FrameBuffer, dst: &mut FrameBuffer) {
    dst.pixels.fill(0);
    if src.width == 0 || src.height == 0 || dst.width == 0 || dst.height == 0 {
        return;
    }
    // Largest scale that fits both axes.
    let scale = (dst.width as f32 / src.width as f32).min(dst.height as f32 / src.height as f32);
    let out_w = ((src.width as f32 * scale) as usize).clamp(1, dst.width);
    let out_h = ((src.height as f32 * scale) as usize).clamp(1, dst.height);
    let off_x = (dst.width - out_w) / 2;
    let off_y = (dst.height - out_h) / 2;

    for y in 0..out_h {
        let sy = (y * src.height / out_h).min(src.height - 1);
        let src_row = &src.pixels[sy * src.width..(sy + 1) * src.width];
        let dst_row = &mut dst.pixels[(off_y + y) * dst.width + off_x..][..out_w];
        for (x, px) in dst_row.iter_mut().enumerate() {
            *px = src_row[(x * src.width / out_w).min(src.width - 1)];
        }
    }
}

/* ---------- 5x7 bitmap font (ASCII subset for "PROCESSING | FPS: 00.0") ---------- */

/// Return a 5x7 glyph bitmap for a limited character set.
/// Each u8 is a row; the low 5 bits are the pixels (bit 4 = leftmost).
fn glyph5x7(ch: char) -> Option<[u8; 7]> {
    // Helper macro to define a glyph quickly
    macro_rules! g { ($a:expr,$b:expr,$c:expr,$d:expr,$e:expr,$f:expr,$g:expr) => {
        Some([$a,$b,$c,$d,$e,$f,$g])
    }; }

    match ch {
        // Digits 0..9
        '0' => g!(0b01110,0b10001,0b10011,0b10101,0b11001,0b10001,0b01110),
        '1' => g!(0b00100,0b01100,0b00100,0b00100,0b00100,0b00100,0b01110),
        '2' => g!(0b01110,0b10001,0b00001,0b00010,0b00100,0b01000,0b11111),
        '3' => g!(0b11110,0b00001,0b00001,0b01110,0b00001,0b00001,0b11110),
        '4' => g!(0b00010,0b00110,0b01010,0b10010,0b11111,0b00010,0b00010),
        '5' => g!(0b11111,0b10000,0b11110,0b00001,0b00001,0b10001,0b01110),
        '6' => g!(0b00110,0b01000,0b10000,0b11110,0b10001,0b10001,0b01110),
        '7' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b01000,0b01000),
        '8' => g!(0b01110,0b10001,0b10001,0b01110,0b10001,0b10001,0b01110),
        '9' => g!(0b01110,0b10001,0b10001,0b01111,0b00001,0b00010,0b01100),

        // Uppercase letters used by the HUD
        'C' => g!(0b01110,0b10001,0b10000,0b10000,0b10000,0b10001,0b01110),
        'E' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b11111),
        'F' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b10000),
        'G' => g!(0b01110,0b10001,0b10000,0b10111,0b10001,0b10001,0b01111),
        'I' => g!(0b01110,0b00100,0b00100,0b00100,0b00100,0b00100,0b01110),
        'L' => g!(0b10000,0b10000,0b10000,0b10000,0b10000,0b10000,0b11111),
        'N' => g!(0b10001,0b11001,0b10101,0b10011,0b10001,0b10001,0b10001),
        'O' => g!(0b01110,0b10001,0b10001,0b10001,0b10001,0b10001,0b01110),
        'P' => g!(0b11110,0b10001,0b10001,0b11110,0b10000,0b10000,0b10000),
        'R' => g!(0b11110,0b10001,0b10001,0b11110,0b10100,0b10010,0b10001),
        'S' => g!(0b01111,0b10000,0b10000,0b01110,0b00001,0b00001,0b11110),
        'V' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b01010,0b00100),

        // Punctuation: space, vertical bar, colon, dot
        ' ' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00000,0b00000),
        '|' => g!(0b00100,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        ':' => g!(0b00000,0b00100,0b00000,0b00000,0b00100,0b00000,0b00000),
        '.' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00100,0b00000),

        _ => None,
    }
}

/// Draw a single 5x7 character at (x,y).
/// Visual: a tiny glyph appears with a 1-pixel black shadow for contrast.
fn draw_char_5x7(fb: &mut FrameBuffer, x: i32, y: i32, ch: char, color: u32) {
    if let Some(rows) = glyph5x7(ch) {
        // Shadow pass first, then the glyph itself on top.
        for (dx, shade) in [(1, 0x00000000), (0, color)] {
            for (ry, rowbits) in rows.iter().enumerate() {
                for rx in 0..5 {
                    if (rowbits & (1 << (4 - rx))) != 0 {
                        put_pixel(fb, x + rx as i32 + dx, y + ry as i32 + dx, shade);
                    }
                }
            }
        }
    }
}

/// Draw a text string using 5x7 glyphs.
/// Visual: a compact HUD string appears; each glyph is 5x7 with 1-pixel spacing.
pub fn draw_text_5x7(fb: &mut FrameBuffer, mut x: i32, y: i32, text: &str, color: u32) {
    for ch in text.chars() {
        draw_char_5x7(fb, x, y, ch, color);
        x += 6; // 5 pixels glyph width + 1 pixel spacing
    }
}
