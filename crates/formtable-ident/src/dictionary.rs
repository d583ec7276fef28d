//! Local Thai → English lookup for common form vocabulary.

/// `(thai, english)` pairs. Compound entries are listed alongside their parts
/// so that exact matches win over segmentation.
const ENTRIES: &[(&str, &str)] = &[
  ("ชื่อ", "name"),
  ("ชื่อเล่น", "nickname"),
  ("ชื่อผู้ใช้", "username"),
  ("นามสกุล", "surname"),
  ("คำนำหน้า", "title"),
  ("อายุ", "age"),
  ("เพศ", "gender"),
  ("วันเกิด", "birth date"),
  ("วันที่", "date"),
  ("วัน", "day"),
  ("เดือน", "month"),
  ("ปี", "year"),
  ("เวลา", "time"),
  ("ที่อยู่", "address"),
  ("บ้านเลขที่", "house number"),
  ("ถนน", "road"),
  ("ตำบล", "subdistrict"),
  ("อำเภอ", "district"),
  ("จังหวัด", "province"),
  ("รหัสไปรษณีย์", "postal code"),
  ("ประเทศ", "country"),
  ("เบอร์โทร", "phone"),
  ("เบอร์โทรศัพท์", "phone number"),
  ("โทรศัพท์", "telephone"),
  ("มือถือ", "mobile"),
  ("อีเมล", "email"),
  ("อีเมล์", "email"),
  ("เว็บไซต์", "website"),
  ("ลิงก์", "link"),
  ("เลขบัตรประชาชน", "national id"),
  ("อาชีพ", "occupation"),
  ("การศึกษา", "education"),
  ("สัญชาติ", "nationality"),
  ("ศาสนา", "religion"),
  ("สถานภาพ", "marital status"),
  ("บริษัท", "company"),
  ("หน่วยงาน", "organization"),
  ("แผนก", "department"),
  ("ตำแหน่ง", "position"),
  ("ผู้ติดต่อ", "contact"),
  ("ข้อมูล", "information"),
  ("ส่วนตัว", "personal"),
  ("ลูกค้า", "customer"),
  ("สินค้า", "product"),
  ("ราคา", "price"),
  ("จำนวน", "quantity"),
  ("ยอดรวม", "total"),
  ("น้ำหนัก", "weight"),
  ("ส่วนสูง", "height"),
  ("คะแนน", "score"),
  ("ความพึงพอใจ", "satisfaction"),
  ("ความคิดเห็น", "comment"),
  ("ข้อเสนอแนะ", "suggestion"),
  ("หมายเหตุ", "remark"),
  ("รายละเอียด", "detail"),
  ("หัวข้อ", "topic"),
  ("ประเภท", "type"),
  ("สถานะ", "status"),
  ("ที่ตั้ง", "location"),
  ("พิกัด", "coordinates"),
  ("รูปภาพ", "image"),
  ("รูป", "photo"),
  ("ไฟล์", "file"),
  ("เอกสาร", "document"),
  ("ลายเซ็น", "signature"),
  ("แบบฟอร์ม", "form"),
  ("แบบสอบถาม", "survey"),
  ("ส่วน", "section"),
  ("บันทึก", "save"),
  ("ส่ง", "submit"),
  ("ยกเลิก", "cancel"),
  ("ลบ", "delete"),
  ("แก้ไข", "edit"),
  ("ค้นหา", "search"),
  ("อนุมัติ", "approve"),
  ("เริ่มต้น", "start"),
  ("สิ้นสุด", "end"),
  ("ผู้", "person"),
  ("ของ", "of"),
  ("และ", "and"),
  ("หรือ", "or"),
];

/// Strip whitespace and ASCII punctuation: `"ชื่อ - นามสกุล"` → `"ชื่อนามสกุล"`.
fn normalize(label: &str) -> String {
  label.chars().filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation()).collect()
}

fn exact(key: &str) -> Option<&'static str> {
  ENTRIES.iter().find(|(th, _)| *th == key).map(|(_, en)| *en)
}

/// Translate `label` by exact match, or else by segmenting it into dictionary
/// words with greedy longest-prefix matching. Returns `None` unless the whole
/// label is covered.
pub fn lookup(label: &str) -> Option<String> {
  let text = normalize(label);
  if text.is_empty() {
    return None;
  }
  if let Some(en) = exact(&text) {
    return Some(en.to_owned());
  }

  let mut rest = text.as_str();
  let mut words = Vec::new();
  while !rest.is_empty() {
    let (th, en) = ENTRIES
      .iter()
      .filter(|(th, _)| rest.starts_with(th))
      .max_by_key(|(th, _)| th.len())?;
    words.push(*en);
    rest = &rest[th.len()..];
  }
  Some(words.join(" "))
}
