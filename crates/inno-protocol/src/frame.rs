//! 强类型帧
//!
//! 解码边界：先解析头部，再按类型标签将载荷物化为对应条目数组，
//! 调用方看不到原始 union 字节。

use crate::{
    AlarmMessage, BoundingBox, CompactPoint, CompactPointExt, FrameHeader, FrameType,
    FramingError, HEADER_SIZE, ProtocolError, RawPoint, TextItem,
};

/// 按类型物化后的条目
#[derive(Debug, Clone, PartialEq)]
pub enum FrameItems {
    None,
    Points(Vec<RawPoint>),
    CompactPoints(Vec<CompactPoint>),
    CompactPointsExt(Vec<CompactPointExt>),
    BoundingBoxes(Vec<BoundingBox>),
    Texts(Vec<TextItem>),
    Alarms(Vec<AlarmMessage>),
}

impl FrameItems {
    pub fn len(&self) -> usize {
        match self {
            FrameItems::None => 0,
            FrameItems::Points(v) => v.len(),
            FrameItems::CompactPoints(v) => v.len(),
            FrameItems::CompactPointsExt(v) => v.len(),
            FrameItems::BoundingBoxes(v) => v.len(),
            FrameItems::Texts(v) => v.len(),
            FrameItems::Alarms(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            FrameItems::None => FrameType::None,
            FrameItems::Points(_) => FrameType::Point,
            FrameItems::CompactPoints(_) => FrameType::CompactPoint,
            FrameItems::CompactPointsExt(_) => FrameType::CompactPointExt,
            FrameItems::BoundingBoxes(_) => FrameType::BoundingBox,
            FrameItems::Texts(_) => FrameType::Text,
            FrameItems::Alarms(_) => FrameType::Alarm,
        }
    }
}

/// 解码后的一帧
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 传输层携带的 lidar 句柄/来源 id
    pub source_id: u32,
    pub header: FrameHeader,
    pub items: FrameItems,
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        self.items.frame_type()
    }

    /// 紧凑点切片（其他类型返回 `None`）
    pub fn compact_points(&self) -> Option<&[CompactPoint]> {
        match &self.items {
            FrameItems::CompactPoints(v) => Some(v),
            _ => None,
        }
    }

    /// 由条目构造帧，头部的类型、条目数、条目大小会被覆盖
    pub fn from_items(source_id: u32, mut header: FrameHeader, items: FrameItems) -> Self {
        let fresh = FrameHeader::new(items.frame_type(), items.len() as u32);
        header.type_tag = fresh.type_tag;
        header.item_number = fresh.item_number;
        header.item_size = fresh.item_size;
        header.header_size = HEADER_SIZE as u16;
        Self {
            source_id,
            header,
            items,
        }
    }

    /// 构造紧凑点帧
    pub fn from_compact_points(
        source_id: u32,
        header: FrameHeader,
        points: Vec<CompactPoint>,
    ) -> Self {
        Self::from_items(source_id, header, FrameItems::CompactPoints(points))
    }

    /// 构造单条告警帧
    pub fn from_alarm(source_id: u32, alarm: AlarmMessage) -> Self {
        Self {
            source_id,
            header: FrameHeader::new(FrameType::Alarm, 1),
            items: FrameItems::Alarms(vec![alarm]),
        }
    }

    /// 载荷字节（条目数组），用于回环测试和录制
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match &self.items {
            FrameItems::None => {}
            FrameItems::Points(v) => v.iter().for_each(|p| out.extend_from_slice(&p.encode())),
            FrameItems::CompactPoints(v) => {
                v.iter().for_each(|p| out.extend_from_slice(&p.encode()))
            }
            FrameItems::CompactPointsExt(v) => {
                v.iter().for_each(|p| out.extend_from_slice(&p.encode()))
            }
            FrameItems::BoundingBoxes(v) => {
                v.iter().for_each(|b| out.extend_from_slice(&b.encode()))
            }
            FrameItems::Texts(v) => v.iter().for_each(|t| out.extend_from_slice(&t.encode())),
            FrameItems::Alarms(v) => v.iter().for_each(|a| out.extend_from_slice(&a.encode())),
        }
        out
    }
}

/// 在缓冲区中逐个解码定长条目
fn decode_items<T>(
    payload: &[u8],
    item_size: usize,
    decode: impl Fn(&[u8]) -> Result<T, ProtocolError>,
) -> Result<Vec<T>, ProtocolError> {
    payload.chunks_exact(item_size).map(decode).collect()
}

/// 解码一帧
///
/// # 校验
///
/// 1. `header_size` 必须等于 76
/// 2. 类型标签必须已知，且 `item_size` 与该类型的静态大小一致
/// 3. 载荷长度必须是条目大小的整数倍
/// 4. 载荷条目数必须等于头部声明的 `item_number`
///
/// 任何一项失败都返回 [`FramingError`]，不产生帧。
pub fn decode_frame(
    source_id: u32,
    header_bytes: &[u8],
    payload: &[u8],
) -> Result<Frame, ProtocolError> {
    if header_bytes.len() != HEADER_SIZE {
        return Err(FramingError::HeaderSize {
            expected: HEADER_SIZE,
            actual: header_bytes.len(),
        }
        .into());
    }
    let header = FrameHeader::decode(header_bytes)?;
    if usize::from(header.header_size) != HEADER_SIZE {
        return Err(FramingError::HeaderSize {
            expected: HEADER_SIZE,
            actual: usize::from(header.header_size),
        }
        .into());
    }

    let frame_type = header
        .frame_type()
        .ok_or(FramingError::UnknownType(header.type_tag))?;

    let Some(item_size) = frame_type.item_size() else {
        // 空类型：不应携带条目
        if header.item_number != 0 || !payload.is_empty() {
            return Err(FramingError::ItemCountMismatch {
                declared: header.item_number,
                actual: payload.len(),
            }
            .into());
        }
        return Ok(Frame {
            source_id,
            header,
            items: FrameItems::None,
        });
    };

    if usize::from(header.item_size) != item_size {
        return Err(FramingError::ItemSize {
            frame_type,
            expected: item_size,
            actual: usize::from(header.item_size),
        }
        .into());
    }
    if payload.len() % item_size != 0 {
        return Err(FramingError::PayloadNotAligned {
            length: payload.len(),
            item_size,
        }
        .into());
    }
    let count = payload.len() / item_size;
    if count != header.item_number as usize {
        return Err(FramingError::ItemCountMismatch {
            declared: header.item_number,
            actual: count,
        }
        .into());
    }

    let items = match frame_type {
        FrameType::None => FrameItems::None,
        FrameType::Point => FrameItems::Points(decode_items(payload, item_size, RawPoint::decode)?),
        FrameType::CompactPoint => {
            FrameItems::CompactPoints(decode_items(payload, item_size, CompactPoint::decode)?)
        }
        FrameType::CompactPointExt => FrameItems::CompactPointsExt(decode_items(
            payload,
            item_size,
            CompactPointExt::decode,
        )?),
        FrameType::BoundingBox => {
            FrameItems::BoundingBoxes(decode_items(payload, item_size, BoundingBox::decode)?)
        }
        FrameType::Text => FrameItems::Texts(decode_items(payload, item_size, TextItem::decode)?),
        FrameType::Alarm => {
            // 每个告警帧只携带一条消息
            if count != 1 {
                return Err(FramingError::AlarmCount(count).into());
            }
            FrameItems::Alarms(decode_items(payload, item_size, AlarmMessage::decode)?)
        }
    };

    Ok(Frame {
        source_id,
        header,
        items,
    })
}
