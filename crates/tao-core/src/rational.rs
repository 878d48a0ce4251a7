//! 有理数类型及整数重缩放运算, 用于时间基 (time_base)、帧率等场景.
//!
//! 对标 FFmpeg 的 `AVRational` 与 `av_rescale_rnd` / `av_reduce` / `av_add_stable`.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 广泛用于表示时间基 (time_base)、帧率、宽高比等.
/// 例如: 时间基 1/90000 表示 90kHz 时钟, 帧率 30000/1001 表示 29.97fps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

/// 整数重缩放的舍入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// 向零舍入
    Zero,
    /// 远离零舍入
    Inf,
    /// 向负无穷舍入
    Down,
    /// 向正无穷舍入
    Up,
    /// 四舍五入, 中点远离零
    NearInf,
}

impl Rounding {
    /// 对负数取反后使用的等价舍入方式
    const fn mirrored(self) -> Self {
        match self {
            Self::Down => Self::Up,
            Self::Up => Self::Down,
            other => other,
        }
    }
}

impl Rational {
    /// 创建新的有理数
    ///
    /// # 参数
    /// - `num`: 分子
    /// - `den`: 分母 (不应为 0)
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 零值
    pub const ZERO: Self = Self { num: 0, den: 1 };

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 常用时间基: 微秒 (1/1_000_000)
    pub const MICRO: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    /// 将 64 位分数约分并逼近到分子分母均不超过 `max` 的有理数
    ///
    /// 返回值的第二项表示结果是否精确.
    /// 超出范围时使用连分数求最佳逼近.
    pub fn reduce_from(num: i64, den: i64, max: i64) -> (Self, bool) {
        let negative = (num < 0) != (den < 0);
        let mut num = i128::from(num).abs();
        let mut den = i128::from(den).abs();
        let max = i128::from(max.max(0));
        let g = gcd(num, den);
        if g != 0 {
            num /= g;
            den /= g;
        }

        let (mut a0n, mut a0d) = (0i128, 1i128);
        let (mut a1n, mut a1d) = (1i128, 0i128);
        if num <= max && den <= max {
            a1n = num;
            a1d = den;
            den = 0;
        }
        while den != 0 {
            let x = num / den;
            let next_den = num - den * x;
            let a2n = x * a1n + a0n;
            let a2d = x * a1d + a0d;
            if a2n > max || a2d > max {
                let mut x = x;
                if a1n != 0 {
                    x = (max - a0n) / a1n;
                }
                if a1d != 0 {
                    x = x.min((max - a0d) / a1d);
                }
                if den * (2 * x * a1d + a0d) > num * a1d {
                    a1n = x * a1n + a0n;
                    a1d = x * a1d + a0d;
                }
                break;
            }
            a0n = a1n;
            a0d = a1d;
            a1n = a2n;
            a1d = a2d;
            num = den;
            den = next_den;
        }

        let n = if negative { -a1n } else { a1n };
        (
            Self {
                num: n.clamp(i128::from(i32::MIN), i128::from(i32::MAX)) as i32,
                den: a1d.clamp(0, i128::from(i32::MAX)) as i32,
            },
            den == 0,
        )
    }
}

impl std::ops::Mul for Rational {
    type Output = Self;

    /// 两个有理数相乘
    fn mul(self, other: Self) -> Self {
        Self::reduce_from(
            i64::from(self.num) * i64::from(other.num),
            i64::from(self.den) * i64::from(other.den),
            i64::from(i32::MAX),
        )
        .0
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 计算 `a * b / c`, 按指定方式舍入
///
/// 中间结果使用 128 位整数, 不会溢出; 最终结果超出 i64 时饱和.
/// `c <= 0` 或 `b < 0` 时返回 `i64::MIN`.
pub fn rescale_rnd(a: i64, b: i64, c: i64, rnd: Rounding) -> i64 {
    if c <= 0 || b < 0 {
        return i64::MIN;
    }
    if a < 0 {
        return saturate(-rescale_abs(-i128::from(a), b, c, rnd.mirrored()));
    }
    saturate(rescale_abs(i128::from(a), b, c, rnd))
}

fn rescale_abs(a: i128, b: i64, c: i64, rnd: Rounding) -> i128 {
    let c = i128::from(c);
    let r = match rnd {
        Rounding::NearInf => c / 2,
        Rounding::Inf | Rounding::Up => c - 1,
        Rounding::Zero | Rounding::Down => 0,
    };
    (a * i128::from(b) + r) / c
}

fn saturate(v: i128) -> i64 {
    v.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// 计算 `a * b / c`, 四舍五入
pub fn rescale(a: i64, b: i64, c: i64) -> i64 {
    rescale_rnd(a, b, c, Rounding::NearInf)
}

/// 将时间基 `bq` 下的值 `a` 重缩放到时间基 `cq`
pub fn rescale_q(a: i64, bq: Rational, cq: Rational) -> i64 {
    rescale_q_rnd(a, bq, cq, Rounding::NearInf)
}

/// 将时间基 `bq` 下的值 `a` 按指定舍入方式重缩放到时间基 `cq`
pub fn rescale_q_rnd(a: i64, bq: Rational, cq: Rational, rnd: Rounding) -> i64 {
    let b = i64::from(bq.num) * i64::from(cq.den);
    let c = i64::from(cq.num) * i64::from(bq.den);
    rescale_rnd(a, b, c, rnd)
}

/// 在时间基 `ts_tb` 下的时间戳 `ts` 上累加 `inc` 个 `inc_tb` 单位
///
/// 反复累加不可整除的增量时不会产生累积误差.
pub fn add_stable(ts_tb: Rational, ts: i64, inc_tb: Rational, inc: i64) -> i64 {
    let inc_tb = if inc != 1 {
        inc_tb
            * Rational::new(
                inc.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                1,
            )
    } else {
        inc_tb
    };
    let m = i64::from(inc_tb.num) * i64::from(ts_tb.den);
    let d = i64::from(inc_tb.den) * i64::from(ts_tb.num);
    if d == 0 {
        return ts;
    }
    if m % d == 0 {
        if let Some(v) = ts.checked_add(m / d) {
            return v;
        }
    }
    if m < d {
        return ts;
    }
    let old = rescale_q(ts, ts_tb, inc_tb);
    let old_ts = rescale_q(old, inc_tb, ts_tb);
    if old == i64::MAX || old == i64::MIN || old_ts == i64::MIN {
        return ts;
    }
    rescale_q(old + 1, inc_tb, ts_tb).saturating_add(ts.saturating_sub(old_ts))
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_basic_creation() {
        let r = Rational::new(1, 30);
        assert_eq!(r.num, 1);
        assert_eq!(r.den, 30);
    }

    #[test]
    fn test_rational_reduce() {
        let (r, exact) = Rational::reduce_from(30, 60, i64::from(i32::MAX));
        assert!(exact);
        assert_eq!(r, Rational::new(1, 2));
        let (r, _) = Rational::reduce_from(3, -6, i64::from(i32::MAX));
        assert_eq!(r, Rational::new(-1, 2));
    }

    #[test]
    fn test_rational_reduce_from_逼近() {
        let (r, exact) = Rational::reduce_from(1001, 30000, i64::from(i32::MAX));
        assert!(exact);
        assert_eq!(r, Rational::new(1001, 30000));

        // 超出范围时求最佳逼近
        let (r, exact) = Rational::reduce_from(1_000_000_007, 3_000_000_000, 1000);
        assert!(!exact);
        assert_eq!(r, Rational::new(1, 3));
    }

    #[test]
    fn test_rational_display() {
        let r = Rational::new(30000, 1001);
        assert_eq!(format!("{r}"), "30000/1001");
    }

    #[test]
    fn test_rational_mul_无溢出() {
        let r = Rational::new(1, 90000) * Rational::new(90000, 1);
        assert_eq!(r, Rational::new(1, 1));
        let r = Rational::new(1_000_000, 3) * Rational::new(3, 1_000_000);
        assert_eq!(r, Rational::new(1, 1));
    }

    #[test]
    fn test_rescale_舍入方式() {
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::Down), 3);
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::Up), 4);
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::NearInf), 4);
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Down), -4);
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Up), -3);
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Zero), -3);
        assert_eq!(rescale_rnd(1, 1, 0, Rounding::Down), i64::MIN);
    }

    #[test]
    fn test_rescale_q_时间基转换() {
        assert_eq!(
            rescale_q(90000, Rational::new(1, 90000), Rational::new(1, 1000)),
            1000
        );
        assert_eq!(
            rescale_q(i64::MAX / 2, Rational::new(1, 1), Rational::new(1, 90000)),
            i64::MAX
        );
    }

    #[test]
    fn test_add_stable_无累积误差() {
        // 1/30 秒累加 30 次应恰好为 1 秒 (90kHz 下 90000)
        let tb = Rational::new(1, 90000);
        let mut ts = 0;
        for _ in 0..30 {
            ts = add_stable(tb, ts, Rational::new(1, 30), 1);
        }
        assert_eq!(ts, 90000);

        // 29.97fps 在毫秒时间基下累加 3 次
        let tb = Rational::new(1, 1000);
        let mut ts = 0;
        for _ in 0..3 {
            ts = add_stable(tb, ts, Rational::new(1001, 30000), 1);
        }
        assert_eq!(ts, 100);
    }
}
